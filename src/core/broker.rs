use crate::core::db;
use crate::core::error::LedgerError;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Single entry point for database access.
///
/// Each call opens its own connection and releases it on return, error paths
/// included. Writes go through [`DbBroker::with_tx`], which takes SQLite's
/// write lock up front (`BEGIN IMMEDIATE`) so a read-then-write sequence inside
/// the closure cannot interleave with another writer.
pub struct DbBroker {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl DbBroker {
    pub fn new(db_path: &Path, busy_timeout: Duration) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            busy_timeout,
        }
    }

    /// Execute a read-only closure with a fresh connection.
    pub fn with_conn<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, LedgerError>,
    {
        let conn = db::db_connect(&self.db_path, self.busy_timeout)?;
        let result = f(&conn);
        self.log_op(actor, op_name, result.is_ok());
        result
    }

    /// Execute a closure inside one IMMEDIATE transaction.
    ///
    /// Commits when the closure returns `Ok`; on `Err` the transaction is
    /// dropped, which rolls it back.
    pub fn with_tx<F, R>(&self, actor: &str, op_name: &str, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, LedgerError>,
    {
        let mut conn = db::db_connect(&self.db_path, self.busy_timeout)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = match f(&tx) {
            Ok(value) => tx.commit().map(|_| value).map_err(LedgerError::from),
            Err(err) => Err(err),
        };

        self.log_op(actor, op_name, result.is_ok());
        result
    }

    fn log_op(&self, actor: &str, op: &str, ok: bool) {
        let db_id = self
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        if ok {
            tracing::debug!(actor, op, db = %db_id, status = "success", "broker op");
        } else {
            tracing::warn!(actor, op, db = %db_id, status = "error", "broker op");
        }
    }
}
