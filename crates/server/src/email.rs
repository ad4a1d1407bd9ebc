//! Confirmation email rendering and dispatch.
//!
//! Delivery goes through the provider's HTTP API with a bounded timeout.
//! Send failures are reported to callers but never unwind a payment-status
//! update; a successful send flips `confirmation_email_sent` so idempotent
//! webhook replays do not mail the customer twice.

use chrono::{DateTime, Datelike, Utc, Weekday};
use std::time::Duration as StdDuration;

use rosterframe_api::db;
use rosterframe_core::Order;

use crate::storage::{Db, order_from_row, sq_execute, sq_query_row};

/// Outbound requests are abandoned after this long and treated as errors.
const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Production lead time quoted to the customer, in business days.
const PRODUCTION_BUSINESS_DAYS: u32 = 15;

#[derive(Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
    pub api_base: String,
}

impl EmailConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://api.resend.com";
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("order not found")]
    OrderNotFound,
    #[error("email provider rejected the message: {0}")]
    Provider(String),
    #[error("email provider unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database: {0}")]
    Db(String),
}

#[derive(Debug)]
pub enum SendOutcome {
    Sent { provider_id: Option<String> },
    /// A previous send already succeeded; nothing was attempted.
    AlreadySent,
}

pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct Mailer {
    client: reqwest::Client,
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    /// Send the confirmation email for an order and record the outcome on
    /// the order row.
    pub async fn send_confirmation(
        &self,
        db: &Db,
        order_id: &str,
    ) -> Result<SendOutcome, EmailError> {
        let order = {
            let conn = db.conn();
            sq_query_row(&conn, db::orders::find_by_id(order_id), order_from_row)
                .map_err(|e| EmailError::Db(e.to_string()))?
        }
        .ok_or(EmailError::OrderNotFound)?;

        if order.confirmation_email_sent {
            return Ok(SendOutcome::AlreadySent);
        }

        let content = render_confirmation(&order);
        let resp = self
            .client
            .post(format!("{}/emails", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "from": self.config.from,
                "to": [order.customer_email],
                "subject": content.subject,
                "text": content.text,
                "html": content.html,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Provider(format!("HTTP {status}: {body}")));
        }

        let provider_id = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));

        let now = Utc::now().to_rfc3339();
        {
            let conn = db.conn();
            sq_execute(&conn, db::orders::mark_email_sent(&order.id, &now))
                .map_err(|e| EmailError::Db(e.to_string()))?;
        }

        tracing::info!(order_id = %order.id, "confirmation email sent");
        Ok(SendOutcome::Sent { provider_id })
    }
}

/// Render the confirmation template with derived display values.
pub fn render_confirmation(order: &Order) -> EmailContent {
    let total = order.amount_cents - order.discount_cents;
    let delivery = estimated_delivery(order.created_at);
    let subject = format!("Order confirmed: {} for {}", order.plaque_name, order.team_name);

    let discount_line = if order.discount_cents > 0 {
        format!(
            "Subtotal: {}\nDiscount: -{}\n",
            format_cents(order.amount_cents),
            format_cents(order.discount_cents)
        )
    } else {
        String::new()
    };

    let text = format!(
        "Hi {name},\n\n\
         Thanks for your order! Your {plaque} celebrating {team} is headed \
         into production.\n\n\
         Order number: {id}\n\
         {discount_line}Total: {total}\n\
         Estimated delivery: {delivery}\n\n\
         We'll email you again when your plaque ships to \
         {line1}, {city}, {state} {zip}.\n\n\
         The Roster Frame team",
        name = order.customer_name,
        plaque = order.plaque_name,
        team = order.team_name,
        id = order.id,
        discount_line = discount_line,
        total = format_cents(total),
        delivery = delivery,
        line1 = order.shipping.line1,
        city = order.shipping.city,
        state = order.shipping.state,
        zip = order.shipping.postal_code,
    );

    let html = format!(
        "<h1>Thanks for your order, {name}!</h1>\
         <p>Your <strong>{plaque}</strong> celebrating <strong>{team}</strong> \
         is headed into production.</p>\
         <p>Order number: <code>{id}</code><br>\
         Total: <strong>{total}</strong><br>\
         Estimated delivery: {delivery}</p>",
        name = order.customer_name,
        plaque = order.plaque_name,
        team = order.team_name,
        id = order.id,
        total = format_cents(total),
        delivery = delivery,
    );

    EmailContent { subject, text, html }
}

/// Delivery estimate quoted in the confirmation email: the order date plus
/// the production lead time, counting business days only.
pub fn estimated_delivery(created_at: DateTime<Utc>) -> String {
    let mut date = created_at.date_naive();
    let mut remaining = PRODUCTION_BUSINESS_DAYS;
    while remaining > 0 {
        let Some(next) = date.succ_opt() else { break };
        date = next;
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    date.format("%B %-d, %Y").to_string()
}

fn format_cents(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rosterframe_core::{FulfillmentStatus, PaymentStatus, ShippingAddress};

    fn sample_order() -> Order {
        Order {
            id: "ord_1".into(),
            payment_intent_id: "pi_1".into(),
            payment_status: PaymentStatus::Succeeded,
            fulfillment_status: FulfillmentStatus::Pending,
            customer_name: "Sam".into(),
            customer_email: "sam@example.com".into(),
            amount_cents: 12900,
            discount_cents: 1000,
            shipping: ShippingAddress {
                line1: "1 Main St".into(),
                line2: None,
                city: "Denver".into(),
                state: "CO".into(),
                postal_code: "80202".into(),
                country: "US".into(),
            },
            team_name: "Wolves".into(),
            plaque_name: "Walnut Classic".into(),
            confirmation_email_sent: false,
            confirmation_email_sent_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn renders_totals_discount_and_delivery() {
        let content = render_confirmation(&sample_order());
        assert!(content.subject.contains("Wolves"));
        assert!(content.text.contains("Total: $119.00"));
        assert!(content.text.contains("Discount: -$10.00"));
        assert!(content.text.contains("March 20, 2026"));
        assert!(content.html.contains("Walnut Classic"));
    }

    #[test]
    fn discount_line_omitted_when_zero() {
        let mut order = sample_order();
        order.discount_cents = 0;
        let content = render_confirmation(&order);
        assert!(!content.text.contains("Discount"));
        assert!(content.text.contains("Total: $129.00"));
    }

    #[test]
    fn delivery_estimate_counts_business_days() {
        // Thursday; 15 business days later is a Thursday three weeks out.
        let created = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(estimated_delivery(created), "February 5, 2026");
    }

    #[test]
    fn delivery_estimate_skips_weekends() {
        // Friday start: the count resumes on Monday.
        let created = Utc.with_ymd_and_hms(2026, 8, 21, 9, 30, 0).unwrap();
        assert_eq!(estimated_delivery(created), "September 11, 2026");

        // Saturday start: the first counted day is Monday.
        let created = Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap();
        assert_eq!(estimated_delivery(created), "March 20, 2026");
    }
}
