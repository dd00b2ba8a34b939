//! SQLite bootstrap for the membership store.
//!
//! # Responsibility
//! - Open connections with the pragmas the history store relies on.
//! - Migrate the schema before any repository touches it.
//! - Tell repositories whether a connection is ready for them.
//!
//! # Invariants
//! - A connection returned by `open_db`/`open_db_in_memory` is at
//!   `migrations::latest_version()`.
//! - Repositories refuse connections for which `check_schema` reports a
//!   problem.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

use rusqlite::Connection;

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening or migrating a database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "membership database is at schema {db_version}, this build supports up to {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Why a connection is not usable by a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaProblem {
    VersionMismatch { expected: u32, actual: u32 },
    MissingTable(&'static str),
}

/// Checks that `conn` is fully migrated and holds every table in `tables`.
pub(crate) fn check_schema(
    conn: &Connection,
    tables: &[&'static str],
) -> rusqlite::Result<Option<SchemaProblem>> {
    let expected = migrations::latest_version();
    let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual != expected {
        return Ok(Some(SchemaProblem::VersionMismatch { expected, actual }));
    }

    for &table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Ok(Some(SchemaProblem::MissingTable(table)));
        }
    }
    Ok(None)
}
