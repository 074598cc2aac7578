use crate::core::error::LedgerError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub fn db_connect(db_path: &Path, busy_timeout: Duration) -> Result<Connection, LedgerError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn ensure_meta(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::META_SCHEMA, [])?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<Option<u32>, LedgerError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        None => Ok(None),
        Some(v) => v.parse::<u32>().map(Some).map_err(|_| {
            LedgerError::DatabaseInitializationError(format!(
                "unreadable schema_version '{}'",
                v
            ))
        }),
    }
}

pub fn record_schema_version(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::LEDGER_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Refuse to open a database written by a newer build.
pub fn check_schema_version(conn: &Connection) -> Result<(), LedgerError> {
    if let Some(found) = schema_version(conn)? {
        if found > schemas::LEDGER_SCHEMA_VERSION {
            return Err(LedgerError::DatabaseInitializationError(format!(
                "database schema v{} is newer than supported v{}",
                found,
                schemas::LEDGER_SCHEMA_VERSION
            )));
        }
    }
    Ok(())
}
