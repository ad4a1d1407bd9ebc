//! Order query builders.

use sea_query::{Expr, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::Orders;
use rosterframe_core::PaymentStatus;

/// Column order must match `order_from_row()` positional mappers in the
/// server's storage module.
fn order_columns(q: &mut sea_query::SelectStatement) -> &mut sea_query::SelectStatement {
    q.column(Orders::Id)
        .column(Orders::PaymentIntentId)
        .column(Orders::PaymentStatus)
        .column(Orders::FulfillmentStatus)
        .column(Orders::CustomerName)
        .column(Orders::CustomerEmail)
        .column(Orders::AmountCents)
        .column(Orders::DiscountCents)
        .column(Orders::ShippingLine1)
        .column(Orders::ShippingLine2)
        .column(Orders::ShippingCity)
        .column(Orders::ShippingState)
        .column(Orders::ShippingPostalCode)
        .column(Orders::ShippingCountry)
        .column(Orders::TeamName)
        .column(Orders::PlaqueName)
        .column(Orders::ConfirmationEmailSent)
        .column(Orders::ConfirmationEmailSentAt)
        .column(Orders::CreatedAt)
        .column(Orders::UpdatedAt)
}

/// Parameters for inserting a pending order at checkout initiation.
pub struct InsertParams<'a> {
    pub id: &'a str,
    pub payment_intent_id: &'a str,
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub shipping_line1: &'a str,
    pub shipping_line2: Option<&'a str>,
    pub shipping_city: &'a str,
    pub shipping_state: &'a str,
    pub shipping_postal_code: &'a str,
    pub shipping_country: &'a str,
    pub team_name: &'a str,
    pub plaque_name: &'a str,
    pub created_at: &'a str,
}

pub fn insert(p: &InsertParams) -> Built {
    Query::insert()
        .into_table(Orders::Table)
        .columns([
            Orders::Id,
            Orders::PaymentIntentId,
            Orders::PaymentStatus,
            Orders::FulfillmentStatus,
            Orders::CustomerName,
            Orders::CustomerEmail,
            Orders::AmountCents,
            Orders::DiscountCents,
            Orders::ShippingLine1,
            Orders::ShippingLine2,
            Orders::ShippingCity,
            Orders::ShippingState,
            Orders::ShippingPostalCode,
            Orders::ShippingCountry,
            Orders::TeamName,
            Orders::PlaqueName,
            Orders::ConfirmationEmailSent,
            Orders::CreatedAt,
            Orders::UpdatedAt,
        ])
        .values_panic([
            p.id.into(),
            p.payment_intent_id.into(),
            PaymentStatus::Pending.as_str().into(),
            "pending".into(),
            p.customer_name.into(),
            p.customer_email.into(),
            p.amount_cents.into(),
            p.discount_cents.into(),
            p.shipping_line1.into(),
            p.shipping_line2.into(),
            p.shipping_city.into(),
            p.shipping_state.into(),
            p.shipping_postal_code.into(),
            p.shipping_country.into(),
            p.team_name.into(),
            p.plaque_name.into(),
            false.into(),
            p.created_at.into(),
            p.created_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

pub fn find_by_id(id: &str) -> Built {
    let mut q = Query::select();
    order_columns(&mut q);
    q.from(Orders::Table)
        .and_where(Expr::col(Orders::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn find_by_payment_intent(payment_intent_id: &str) -> Built {
    let mut q = Query::select();
    order_columns(&mut q);
    q.from(Orders::Table)
        .and_where(Expr::col(Orders::PaymentIntentId).eq(payment_intent_id))
        .build(SqliteQueryBuilder)
}

pub fn update_payment_status(id: &str, status: PaymentStatus, updated_at: &str) -> Built {
    Query::update()
        .table(Orders::Table)
        .value(Orders::PaymentStatus, status.as_str())
        .value(Orders::UpdatedAt, updated_at)
        .and_where(Expr::col(Orders::Id).eq(id))
        .build(SqliteQueryBuilder)
}

pub fn mark_email_sent(id: &str, at: &str) -> Built {
    Query::update()
        .table(Orders::Table)
        .value(Orders::ConfirmationEmailSent, true)
        .value(Orders::ConfirmationEmailSentAt, at)
        .value(Orders::UpdatedAt, at)
        .and_where(Expr::col(Orders::Id).eq(id))
        .build(SqliteQueryBuilder)
}
