//! Payment-provider webhook event payloads.
//!
//! Only the fields the checkout flow reads are modeled; everything else in
//! the provider's JSON is ignored by serde.

use serde::{Deserialize, Serialize};

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";

/// Envelope pushed by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider-assigned event id, unique per delivery.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// The payment-intent object inside `payment_intent.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

/// The charge object inside `charge.refunded` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    /// Reference back to the payment intent the charge settled.
    pub payment_intent: String,
    pub amount: i64,
    pub amount_refunded: i64,
}

impl ChargeObject {
    /// Full refund when the refunded amount covers the original charge.
    pub fn is_full_refund(&self) -> bool {
        self.amount_refunded >= self.amount
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed {object} object in webhook event: {source}")]
pub struct EventObjectError {
    object: &'static str,
    #[source]
    source: serde_json::Error,
}

impl WebhookEvent {
    pub fn payment_intent(&self) -> Result<PaymentIntentObject, EventObjectError> {
        serde_json::from_value(self.data.object.clone()).map_err(|source| EventObjectError {
            object: "payment_intent",
            source,
        })
    }

    pub fn charge(&self) -> Result<ChargeObject, EventObjectError> {
        serde_json::from_value(self.data.object.clone()).map_err(|source| EventObjectError {
            object: "charge",
            source,
        })
    }
}
