use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment lifecycle of an order, driven only by verified provider events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    PartialRefund,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartialRefund => "partial_refund",
        }
    }

    /// Whether a webhook-driven transition to `to` is applicable from the
    /// current state.
    ///
    /// Transitions are conditioned on current state so duplicate or
    /// out-of-order provider deliveries are absorbed: a replayed event maps
    /// to a no-op instead of a second history row. `Refunded` is terminal.
    /// Repeated partial refunds coalesce into the first `PartialRefund`.
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, to) {
            (Pending, Succeeded) | (Pending, Failed) => true,
            // A retried payment may succeed after an earlier failure.
            (Failed, Succeeded) => true,
            (Succeeded, Refunded) | (Succeeded, PartialRefund) => true,
            (PartialRefund, Refunded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "partial_refund" => Ok(Self::PartialRefund),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// Physical fulfillment lifecycle, advanced by back-office actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    InProduction,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for FulfillmentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_production" => Ok(Self::InProduction),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct StatusParseError(pub String);

/// Which of the order's two status tracks a history row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    Payment,
    Fulfillment,
}

impl StatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Fulfillment => "fulfillment",
        }
    }
}

/// Shipping destination captured at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// A customer order, created pending at checkout initiation and mutated only
/// by verified payment-provider events thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Payment-provider reference (unique per order).
    pub payment_intent_id: String,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub shipping: ShippingAddress,
    pub team_name: String,
    pub plaque_name: String,
    pub confirmation_email_sent: bool,
    pub confirmation_email_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit trail entry for an order status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: String,
    pub status_type: StatusType,
    pub old_status: String,
    pub new_status: String,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
