//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/analytics orchestration.
//!
//! # Invariants
//! - Group roster and membership history are only written together, inside
//!   one transaction.
//! - Repository APIs return semantic errors (`*NotFound`, `AlreadyMember`,
//!   `NotAMember`) in addition to DB transport errors.

pub mod directory_repo;
pub mod group_repo;

pub use crate::db::SchemaProblem;

pub(crate) use crate::db::check_schema;

use rusqlite::types::Value;
use uuid::Uuid;

pub(crate) fn parse_uuid_column(value: &str, column: &'static str) -> Result<Uuid, String> {
    Uuid::parse_str(value).map_err(|_| format!("invalid uuid `{value}` in {column}"))
}

pub(crate) fn parse_bool_column(value: i64, column: &'static str) -> Result<bool, String> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(format!("invalid boolean value `{other}` in {column}")),
    }
}

/// Builds `?, ?, ...` placeholders and bind values for an `IN (...)` filter.
pub(crate) fn uuid_in_clause(ids: &[Uuid]) -> (String, Vec<Value>) {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let values = ids.iter().map(|id| Value::Text(id.to_string())).collect();
    (placeholders, values)
}
