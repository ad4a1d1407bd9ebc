//! Shared request/response types, webhook signature verification, and SQL
//! builders used by the Roster Frame server.

pub mod crypto;
pub mod db;

use serde::{Deserialize, Serialize};

use rosterframe_core::{Order, OrderStatusHistory, ShippingAddress};

// ── Orders ──────────────────────────────────────────────────────────────────

/// Checkout initiation payload. The order starts `pending`; payment status
/// only moves on verified provider events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub payment_intent_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    pub shipping: ShippingAddress,
    pub team_name: String,
    pub plaque_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order: Order,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistoryResponse {
    pub entries: Vec<OrderStatusHistory>,
}

// ── Webhook ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ── Confirmation email ──────────────────────────────────────────────────────

/// Internal trigger: re-attempt (or first-attempt) the confirmation email
/// for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfirmationRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfirmationResponse {
    pub sent: bool,
    /// True when a previous send already succeeded and nothing was attempted.
    pub already_sent: bool,
    pub provider_id: Option<String>,
    pub error: Option<String>,
}

// ── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
