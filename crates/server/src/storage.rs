use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rosterframe_api::db::Built;
use rosterframe_core::{Order, OrderStatusHistory, ShippingAddress, StatusType};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("rosterframe.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // WAL for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let migrations = vec![("0001_init", include_str!("../../../migrations/0001_init.sql"))];

    for (name, sql) in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query → rusqlite bridging
// ---------------------------------------------------------------------------

fn sq_params(values: &sea_query::Values) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as Rv;
    use sea_query::Value as Sv;

    values
        .iter()
        .map(|v| match v {
            Sv::Bool(b) => b.map(|b| Rv::Integer(b as i64)).unwrap_or(Rv::Null),
            Sv::TinyInt(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::SmallInt(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::Int(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::BigInt(x) => x.map(Rv::Integer).unwrap_or(Rv::Null),
            Sv::TinyUnsigned(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::SmallUnsigned(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::Unsigned(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::BigUnsigned(x) => x.map(|x| Rv::Integer(x as i64)).unwrap_or(Rv::Null),
            Sv::Float(x) => x.map(|x| Rv::Real(x as f64)).unwrap_or(Rv::Null),
            Sv::Double(x) => x.map(Rv::Real).unwrap_or(Rv::Null),
            Sv::String(s) => s
                .as_ref()
                .map(|s| Rv::Text(s.as_ref().clone()))
                .unwrap_or(Rv::Null),
            Sv::Char(c) => c.map(|c| Rv::Text(c.to_string())).unwrap_or(Rv::Null),
            Sv::Bytes(b) => b
                .as_ref()
                .map(|b| Rv::Blob(b.as_ref().clone()))
                .unwrap_or(Rv::Null),
            #[allow(unreachable_patterns)]
            _ => Rv::Null,
        })
        .collect()
}

/// Execute a built statement.
pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(sq_params(&values)))
}

/// Run a built SELECT expected to yield at most one row.
pub fn sq_query_row<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Option<T>> {
    use rusqlite::OptionalExtension;
    conn.query_row(&sql, rusqlite::params_from_iter(sq_params(&values)), f)
        .optional()
}

/// Run a built SELECT and collect all rows.
pub fn sq_query_map<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(sq_params(&values)), f)?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_status<T: std::str::FromStr>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Column order matches `rosterframe_api::db::orders` select builders.
pub fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    let payment_status: String = row.get(2)?;
    let fulfillment_status: String = row.get(3)?;
    let sent_at: Option<String> = row.get(17)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(Order {
        id: row.get(0)?,
        payment_intent_id: row.get(1)?,
        payment_status: parse_status(2, &payment_status)?,
        fulfillment_status: parse_status(3, &fulfillment_status)?,
        customer_name: row.get(4)?,
        customer_email: row.get(5)?,
        amount_cents: row.get(6)?,
        discount_cents: row.get(7)?,
        shipping: ShippingAddress {
            line1: row.get(8)?,
            line2: row.get(9)?,
            city: row.get(10)?,
            state: row.get(11)?,
            postal_code: row.get(12)?,
            country: row.get(13)?,
        },
        team_name: row.get(14)?,
        plaque_name: row.get(15)?,
        confirmation_email_sent: row.get(16)?,
        confirmation_email_sent_at: sent_at.as_deref().map(|s| parse_timestamp(17, s)).transpose()?,
        created_at: parse_timestamp(18, &created_at)?,
        updated_at: parse_timestamp(19, &updated_at)?,
    })
}

/// Column order matches `rosterframe_api::db::history::list_for_order`.
pub fn history_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderStatusHistory> {
    let status_type: String = row.get(2)?;
    let created_at: String = row.get(7)?;

    Ok(OrderStatusHistory {
        id: row.get(0)?,
        order_id: row.get(1)?,
        status_type: match status_type.as_str() {
            "fulfillment" => StatusType::Fulfillment,
            _ => StatusType::Payment,
        },
        old_status: row.get(3)?,
        new_status: row.get(4)?,
        actor: row.get(5)?,
        note: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}
