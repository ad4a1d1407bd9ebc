use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use rosterframe_api::{
    CreateOrderRequest, CreateOrderResponse, OrderHistoryResponse, OrderResponse,
    SendConfirmationRequest, SendConfirmationResponse, db,
};

use crate::AppState;
use crate::email::{EmailError, SendOutcome};
use crate::error::ApiErr;
use crate::storage::{Db, history_from_row, order_from_row, sq_execute, sq_query_map, sq_query_row};

// ---------------------------------------------------------------------------
// Create order (checkout initiation)
// ---------------------------------------------------------------------------

/// POST /api/orders — create a pending order at checkout initiation.
///
/// Payment status starts `pending` and only moves on verified provider
/// events, never on client input.
pub async fn create_order(
    State(db): State<Db>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiErr> {
    if req.payment_intent_id.trim().is_empty() {
        return Err(ApiErr::bad_request("payment_intent_id is required"));
    }
    if req.customer_name.trim().is_empty() {
        return Err(ApiErr::bad_request("customer_name is required"));
    }
    if !req.customer_email.contains('@') {
        return Err(ApiErr::bad_request("customer_email is not a valid address"));
    }
    if req.amount_cents <= 0 {
        return Err(ApiErr::bad_request("amount_cents must be positive"));
    }
    if req.discount_cents < 0 || req.discount_cents > req.amount_cents {
        return Err(ApiErr::bad_request(
            "discount_cents must be between zero and amount_cents",
        ));
    }

    let order_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let conn = db.conn();
    let result = sq_execute(
        &conn,
        db::orders::insert(&db::orders::InsertParams {
            id: &order_id,
            payment_intent_id: req.payment_intent_id.trim(),
            customer_name: req.customer_name.trim(),
            customer_email: req.customer_email.trim(),
            amount_cents: req.amount_cents,
            discount_cents: req.discount_cents,
            shipping_line1: &req.shipping.line1,
            shipping_line2: req.shipping.line2.as_deref(),
            shipping_city: &req.shipping.city,
            shipping_state: &req.shipping.state,
            shipping_postal_code: &req.shipping.postal_code,
            shipping_country: &req.shipping.country,
            team_name: &req.team_name,
            plaque_name: &req.plaque_name,
            created_at: &now,
        }),
    );

    match result {
        Ok(_) => Ok((StatusCode::CREATED, Json(CreateOrderResponse { order_id }))),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(ApiErr::conflict(
                "an order already exists for this payment reference",
            ))
        }
        Err(e) => Err(ApiErr::from_db("insert order")(e)),
    }
}

// ---------------------------------------------------------------------------
// Read order + history
// ---------------------------------------------------------------------------

/// GET /api/orders/{id}
pub async fn get_order(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiErr> {
    let conn = db.conn();
    let order = sq_query_row(&conn, db::orders::find_by_id(&id), order_from_row)
        .map_err(ApiErr::from_db("load order"))?
        .ok_or_else(|| ApiErr::not_found("order not found"))?;
    Ok(Json(OrderResponse { order }))
}

/// GET /api/orders/{id}/history — audit trail rows, oldest first.
pub async fn get_order_history(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<OrderHistoryResponse>, ApiErr> {
    let conn = db.conn();
    sq_query_row(&conn, db::orders::find_by_id(&id), order_from_row)
        .map_err(ApiErr::from_db("load order"))?
        .ok_or_else(|| ApiErr::not_found("order not found"))?;

    let entries = sq_query_map(&conn, db::history::list_for_order(&id), history_from_row)
        .map_err(ApiErr::from_db("list order history"))?;
    Ok(Json(OrderHistoryResponse { entries }))
}

// ---------------------------------------------------------------------------
// Confirmation email trigger
// ---------------------------------------------------------------------------

/// POST /api/orders/confirmation-email — internal trigger for the
/// confirmation email.
///
/// Provider failures come back as a send status with a short error category;
/// the detailed provider message is only logged.
pub async fn send_confirmation(
    State(state): State<AppState>,
    Json(req): Json<SendConfirmationRequest>,
) -> Result<Json<SendConfirmationResponse>, ApiErr> {
    let Some(mailer) = &state.mailer else {
        return Err(ApiErr::unavailable("email delivery is not configured"));
    };

    match mailer.send_confirmation(&state.db, &req.order_id).await {
        Ok(SendOutcome::Sent { provider_id }) => Ok(Json(SendConfirmationResponse {
            sent: true,
            already_sent: false,
            provider_id,
            error: None,
        })),
        Ok(SendOutcome::AlreadySent) => Ok(Json(SendConfirmationResponse {
            sent: false,
            already_sent: true,
            provider_id: None,
            error: None,
        })),
        Err(EmailError::OrderNotFound) => Err(ApiErr::not_found("order not found")),
        Err(EmailError::Db(e)) => Err(ApiErr::from_db("record email outcome")(e)),
        Err(e @ EmailError::Provider(_)) => {
            tracing::error!(order_id = %req.order_id, "confirmation email failed: {e}");
            Ok(Json(SendConfirmationResponse {
                sent: false,
                already_sent: false,
                provider_id: None,
                error: Some("provider_error".into()),
            }))
        }
        Err(e @ EmailError::Http(_)) => {
            tracing::error!(order_id = %req.order_id, "email provider unreachable: {e}");
            Ok(Json(SendConfirmationResponse {
                sent: false,
                already_sent: false,
                provider_id: None,
                error: Some("provider_unreachable".into()),
            }))
        }
    }
}
