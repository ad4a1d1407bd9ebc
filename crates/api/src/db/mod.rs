//! Shared database schema and query builders for the orders store.

pub mod history;
pub mod orders;
pub mod tables;

pub use tables::*;

/// A built statement: SQL text plus bound values.
pub type Built = (String, sea_query::Values);
