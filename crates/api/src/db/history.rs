//! Status-history query builders. Rows are append-only: there are insert
//! and list builders, and deliberately no update or delete.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::Built;
use super::tables::OrderStatusHistory;
use rosterframe_core::StatusType;

pub struct InsertParams<'a> {
    pub order_id: &'a str,
    pub status_type: StatusType,
    pub old_status: &'a str,
    pub new_status: &'a str,
    pub actor: &'a str,
    pub note: Option<&'a str>,
    pub created_at: &'a str,
}

pub fn insert(p: &InsertParams) -> Built {
    Query::insert()
        .into_table(OrderStatusHistory::Table)
        .columns([
            OrderStatusHistory::OrderId,
            OrderStatusHistory::StatusType,
            OrderStatusHistory::OldStatus,
            OrderStatusHistory::NewStatus,
            OrderStatusHistory::Actor,
            OrderStatusHistory::Note,
            OrderStatusHistory::CreatedAt,
        ])
        .values_panic([
            p.order_id.into(),
            p.status_type.as_str().into(),
            p.old_status.into(),
            p.new_status.into(),
            p.actor.into(),
            p.note.into(),
            p.created_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// History rows for an order, oldest first.
pub fn list_for_order(order_id: &str) -> Built {
    Query::select()
        .column(OrderStatusHistory::Id)
        .column(OrderStatusHistory::OrderId)
        .column(OrderStatusHistory::StatusType)
        .column(OrderStatusHistory::OldStatus)
        .column(OrderStatusHistory::NewStatus)
        .column(OrderStatusHistory::Actor)
        .column(OrderStatusHistory::Note)
        .column(OrderStatusHistory::CreatedAt)
        .from(OrderStatusHistory::Table)
        .and_where(Expr::col(OrderStatusHistory::OrderId).eq(order_id))
        .order_by(OrderStatusHistory::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}
