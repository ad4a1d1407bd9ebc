use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use rosterframe_api::{WebhookAck, crypto, db};
use rosterframe_core::webhook::{self, WebhookEvent};
use rosterframe_core::{Order, PaymentStatus, StatusType};

use crate::AppState;
use crate::error::ApiErr;
use crate::storage::{order_from_row, sq_execute, sq_query_row};

const WEBHOOK_ACTOR: &str = "stripe_webhook";

/// POST /api/webhooks/payment — payment-provider event sink.
///
/// The raw body is verified against the shared secret before anything else;
/// a bad signature rejects with 400 and zero state mutation. DB failures
/// surface as 500 so the provider retries. Email failures never do.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiErr> {
    let secret = &state.config.webhook_secret;
    if secret.is_empty() {
        return Err(ApiErr::internal("webhook secret not configured"));
    }

    let signature = headers
        .get(crypto::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiErr::bad_request("missing signature header"))?;

    crypto::verify_signature(secret, signature, &body, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!("webhook signature rejected: {e}");
        ApiErr::bad_request("invalid webhook signature")
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiErr::bad_request(format!("malformed event payload: {e}")))?;

    // Fast path for same-process redeliveries. The durable guard is the
    // state-conditioned transition below.
    if state.event_cache.get(&event.id).is_some() {
        tracing::info!(event_id = %event.id, "replayed webhook event acknowledged");
        return Ok(Json(WebhookAck { received: true }));
    }

    match event.event_type.as_str() {
        webhook::EVENT_PAYMENT_SUCCEEDED => handle_payment_succeeded(&state, &event).await?,
        webhook::EVENT_PAYMENT_FAILED => handle_payment_failed(&state, &event)?,
        webhook::EVENT_CHARGE_REFUNDED => handle_charge_refunded(&state, &event)?,
        other => {
            tracing::debug!(event_type = other, "ignoring unrecognized webhook event");
        }
    }

    state.event_cache.insert(event.id.clone(), ());
    Ok(Json(WebhookAck { received: true }))
}

async fn handle_payment_succeeded(state: &AppState, event: &WebhookEvent) -> Result<(), ApiErr> {
    let intent = event
        .payment_intent()
        .map_err(|e| ApiErr::bad_request(e.to_string()))?;

    let Some(order) = apply_transition(state, &intent.id, PaymentStatus::Succeeded, None)? else {
        return Ok(());
    };

    // Payment state is the source of truth; email delivery is best-effort.
    if order.confirmation_email_sent {
        return Ok(());
    }
    match &state.mailer {
        Some(mailer) => {
            if let Err(e) = mailer.send_confirmation(&state.db, &order.id).await {
                tracing::warn!(
                    order_id = %order.id,
                    "confirmation email failed, payment state unaffected: {e}"
                );
            }
        }
        None => {
            tracing::warn!(order_id = %order.id, "email delivery not configured; skipping confirmation");
        }
    }
    Ok(())
}

fn handle_payment_failed(state: &AppState, event: &WebhookEvent) -> Result<(), ApiErr> {
    let intent = event
        .payment_intent()
        .map_err(|e| ApiErr::bad_request(e.to_string()))?;
    let note = intent
        .last_payment_error
        .is_some()
        .then_some("provider reported a payment error");
    apply_transition(state, &intent.id, PaymentStatus::Failed, note)?;
    Ok(())
}

fn handle_charge_refunded(state: &AppState, event: &WebhookEvent) -> Result<(), ApiErr> {
    let charge = event
        .charge()
        .map_err(|e| ApiErr::bad_request(e.to_string()))?;
    let target = if charge.is_full_refund() {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartialRefund
    };
    let note = format!(
        "refunded {} of {} cents",
        charge.amount_refunded, charge.amount
    );
    apply_transition(state, &charge.payment_intent, target, Some(&note))?;
    Ok(())
}

/// Look up the order by provider reference and apply a state-conditioned
/// payment transition plus its history row under one connection lock.
///
/// Returns the order as loaded (pre-transition) when a transition was
/// applied; `None` when the event was absorbed (unknown reference, replay,
/// or inapplicable transition).
fn apply_transition(
    state: &AppState,
    payment_intent_id: &str,
    target: PaymentStatus,
    note: Option<&str>,
) -> Result<Option<Order>, ApiErr> {
    let conn = state.db.conn();

    let Some(order) = sq_query_row(
        &conn,
        db::orders::find_by_payment_intent(payment_intent_id),
        order_from_row,
    )
    .map_err(ApiErr::from_db("load order by payment intent"))?
    else {
        tracing::warn!(
            payment_intent = payment_intent_id,
            "webhook event for unknown payment reference"
        );
        return Ok(None);
    };

    if !order.payment_status.can_transition_to(target) {
        tracing::info!(
            order_id = %order.id,
            from = %order.payment_status,
            to = %target,
            "transition not applicable; event absorbed"
        );
        return Ok(None);
    }

    let now = Utc::now().to_rfc3339();
    sq_execute(
        &conn,
        db::orders::update_payment_status(&order.id, target, &now),
    )
    .map_err(ApiErr::from_db("update payment status"))?;
    sq_execute(
        &conn,
        db::history::insert(&db::history::InsertParams {
            order_id: &order.id,
            status_type: StatusType::Payment,
            old_status: order.payment_status.as_str(),
            new_status: target.as_str(),
            actor: WEBHOOK_ACTOR,
            note,
            created_at: &now,
        }),
    )
    .map_err(ApiErr::from_db("append status history"))?;

    Ok(Some(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::email::{EmailConfig, Mailer, stub_provider};
    use crate::routes::orders::create_order;
    use crate::storage::{Db, history_from_row, init_db, sq_query_map};
    use crate::{AppConfig, AppState};
    use axum::http::StatusCode;
    use chrono::Duration;
    use rosterframe_api::{CreateOrderRequest, OrderHistoryResponse};
    use rosterframe_core::OrderStatusHistory;
    use rosterframe_core::ShippingAddress;
    use rosterframe_core::clock::SystemClock;
    use std::sync::Arc;

    const SECRET: &str = "whsec_test123";

    fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let db = init_db(dir.path()).unwrap();
        let state = AppState {
            db,
            config: AppConfig {
                webhook_secret: SECRET.into(),
            },
            mailer: None,
            event_cache: TtlCache::new(Duration::hours(24), Arc::new(SystemClock)),
        };
        (dir, state)
    }

    async fn seed_order(db: &Db, payment_intent_id: &str) -> String {
        let req = CreateOrderRequest {
            payment_intent_id: payment_intent_id.into(),
            customer_name: "Sam".into(),
            customer_email: "sam@example.com".into(),
            amount_cents: 12900,
            discount_cents: 0,
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
        };
        let (_, Json(resp)) = create_order(State(db.clone()), Json(req)).await.unwrap();
        resp.order_id
    }

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            crypto::SIGNATURE_HEADER,
            crypto::signature_header(secret, Utc::now().timestamp(), body)
                .parse()
                .unwrap(),
        );
        headers
    }

    fn intent_event(event_id: &str, event_type: &str, payment_intent_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": event_type,
            "data": {"object": {"id": payment_intent_id, "amount": 12900}}
        }))
        .unwrap()
    }

    fn refund_event(event_id: &str, payment_intent_id: &str, amount_refunded: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": event_id,
            "type": "charge.refunded",
            "data": {"object": {
                "id": "ch_1",
                "payment_intent": payment_intent_id,
                "amount": 12900,
                "amount_refunded": amount_refunded
            }}
        }))
        .unwrap()
    }

    fn load_order(db: &Db, payment_intent_id: &str) -> Order {
        let conn = db.conn();
        sq_query_row(
            &conn,
            db::orders::find_by_payment_intent(payment_intent_id),
            order_from_row,
        )
        .unwrap()
        .unwrap()
    }

    fn load_history(db: &Db, order_id: &str) -> Vec<OrderStatusHistory> {
        let conn = db.conn();
        sq_query_map(&conn, db::history::list_for_order(order_id), history_from_row).unwrap()
    }

    async fn deliver(state: &AppState, body: Vec<u8>) -> Result<Json<WebhookAck>, ApiErr> {
        let headers = signed_headers(SECRET, &body);
        payment_webhook(State(state.clone()), headers, Bytes::from(body)).await
    }

    fn mailer_for(stub: &stub_provider::StubProvider) -> Arc<Mailer> {
        Arc::new(
            Mailer::new(EmailConfig {
                api_key: "re_test".into(),
                from: "Roster Frame <orders@test.invalid>".into(),
                api_base: stub.base_url.clone(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn invalid_signature_never_mutates() {
        let (_dir, state) = test_state();
        let order_id = seed_order(&state.db, "pi_1").await;

        let body = intent_event("evt_1", "payment_intent.succeeded", "pi_1");
        let headers = signed_headers("wrong_secret", &body);
        let err = payment_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let order = load_order(&state.db, "pi_1");
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(load_history(&state.db, &order_id).is_empty());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let (_dir, state) = test_state();
        let body = intent_event("evt_1", "payment_intent.succeeded", "pi_1");
        let err = payment_webhook(State(state), HeaderMap::new(), Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payment_succeeded_transitions_and_records_history() {
        let (_dir, state) = test_state();
        let order_id = seed_order(&state.db, "pi_1").await;

        let Json(ack) = deliver(&state, intent_event("evt_1", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();
        assert!(ack.received);

        let order = load_order(&state.db, "pi_1");
        assert_eq!(order.payment_status, PaymentStatus::Succeeded);

        let history = load_history(&state.db, &order_id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_status, "pending");
        assert_eq!(history[0].new_status, "succeeded");
        assert_eq!(history[0].actor, "stripe_webhook");
    }

    #[tokio::test]
    async fn replayed_event_applies_once() {
        let (_dir, state) = test_state();
        let order_id = seed_order(&state.db, "pi_1").await;

        let body = intent_event("evt_1", "payment_intent.succeeded", "pi_1");
        deliver(&state, body.clone()).await.unwrap();
        // Same event id: short-circuited by the event cache.
        deliver(&state, body).await.unwrap();
        // Fresh event id, same intent: absorbed by the state guard.
        deliver(&state, intent_event("evt_2", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();

        assert_eq!(load_history(&state.db, &order_id).len(), 1);
    }

    #[tokio::test]
    async fn succeeded_webhook_sends_exactly_one_email_across_replays() {
        let (_dir, mut state) = test_state();
        let stub = stub_provider::spawn(StatusCode::OK).await;
        state.mailer = Some(mailer_for(&stub));
        let order_id = seed_order(&state.db, "pi_1").await;

        let body = intent_event("evt_1", "payment_intent.succeeded", "pi_1");
        deliver(&state, body.clone()).await.unwrap();
        // Same event id, fresh event id: neither may mail again.
        deliver(&state, body).await.unwrap();
        deliver(&state, intent_event("evt_2", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();

        assert_eq!(stub.sends(), 1);
        let order = load_order(&state.db, "pi_1");
        assert!(order.confirmation_email_sent);
        assert!(order.confirmation_email_sent_at.is_some());
        assert_eq!(load_history(&state.db, &order_id).len(), 1);
    }

    #[tokio::test]
    async fn email_failure_leaves_payment_state_committed() {
        let (_dir, mut state) = test_state();
        let stub = stub_provider::spawn(StatusCode::INTERNAL_SERVER_ERROR).await;
        state.mailer = Some(mailer_for(&stub));
        seed_order(&state.db, "pi_1").await;

        let Json(ack) = deliver(&state, intent_event("evt_1", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();
        assert!(ack.received);

        let order = load_order(&state.db, "pi_1");
        assert_eq!(order.payment_status, PaymentStatus::Succeeded);
        assert!(!order.confirmation_email_sent);
    }

    #[tokio::test]
    async fn payment_failed_transitions_to_failed() {
        let (_dir, state) = test_state();
        let order_id = seed_order(&state.db, "pi_1").await;

        deliver(
            &state,
            intent_event("evt_1", "payment_intent.payment_failed", "pi_1"),
        )
        .await
        .unwrap();

        assert_eq!(
            load_order(&state.db, "pi_1").payment_status,
            PaymentStatus::Failed
        );
        let history = load_history(&state.db, &order_id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].new_status, "failed");
    }

    #[tokio::test]
    async fn full_refund_maps_to_refunded() {
        let (_dir, state) = test_state();
        seed_order(&state.db, "pi_1").await;

        deliver(&state, intent_event("evt_1", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();
        deliver(&state, refund_event("evt_2", "pi_1", 12900))
            .await
            .unwrap();

        assert_eq!(
            load_order(&state.db, "pi_1").payment_status,
            PaymentStatus::Refunded
        );
    }

    #[tokio::test]
    async fn partial_refund_maps_to_partial_then_full_completes() {
        let (_dir, state) = test_state();
        let order_id = seed_order(&state.db, "pi_1").await;

        deliver(&state, intent_event("evt_1", "payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();
        deliver(&state, refund_event("evt_2", "pi_1", 2500))
            .await
            .unwrap();
        assert_eq!(
            load_order(&state.db, "pi_1").payment_status,
            PaymentStatus::PartialRefund
        );

        deliver(&state, refund_event("evt_3", "pi_1", 12900))
            .await
            .unwrap();
        assert_eq!(
            load_order(&state.db, "pi_1").payment_status,
            PaymentStatus::Refunded
        );
        assert_eq!(load_history(&state.db, &order_id).len(), 3);
    }

    #[tokio::test]
    async fn unrecognized_event_type_is_acknowledged() {
        let (_dir, state) = test_state();
        let Json(ack) = deliver(&state, intent_event("evt_1", "customer.created", "pi_1"))
            .await
            .unwrap();
        assert!(ack.received);
    }

    #[tokio::test]
    async fn unknown_payment_reference_is_acknowledged() {
        let (_dir, state) = test_state();
        let Json(ack) = deliver(
            &state,
            intent_event("evt_1", "payment_intent.succeeded", "pi_missing"),
        )
        .await
        .unwrap();
        assert!(ack.received);
    }

    #[tokio::test]
    async fn malformed_payload_with_valid_signature_is_rejected() {
        let (_dir, state) = test_state();
        let err = deliver(&state, b"{\"not\":\"an event\"}".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn history_response_serializes_entries() {
        // The admin UI consumes this shape; keep it stable.
        let resp = OrderHistoryResponse { entries: vec![] };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("entries").unwrap().is_array());
    }
}
