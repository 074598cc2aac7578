//! Subsystem registration: one table of schema initializers.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::db;
use crate::core::error::LedgerError;
use crate::core::store::Store;
use crate::plugins::{definitions, history, ladder, mapping, questions, rubric};
use rusqlite::Connection;

pub(crate) struct SubsystemInit {
    /// Subsystem identifier, reported when initialization fails.
    pub name: &'static str,
    pub initialize_db: fn(&Connection) -> Result<(), LedgerError>,
}

/// All subsystems that own tables. Entry tables come before the history table
/// that back-references them.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "rubric", initialize_db: rubric::initialize_rubric_db },
    SubsystemInit { name: "ladder", initialize_db: ladder::initialize_ladder_db },
    SubsystemInit { name: "history", initialize_db: history::initialize_history_db },
    SubsystemInit { name: "mapping", initialize_db: mapping::initialize_mapping_db },
    SubsystemInit { name: "definitions", initialize_db: definitions::initialize_definitions_db },
    SubsystemInit { name: "questions", initialize_db: questions::initialize_questions_db },
];

/// Initialize every subsystem's tables inside one transaction.
pub(crate) fn initialize_all_dbs(store: &Store) -> Result<(), LedgerError> {
    store.broker().with_tx("ledger", "store.init", |conn| {
        db::ensure_meta(conn)?;
        db::check_schema_version(conn)?;
        for sub in SUBSYSTEMS {
            (sub.initialize_db)(conn).map_err(|e| {
                LedgerError::DatabaseInitializationError(format!("{}: {}", sub.name, e))
            })?;
        }
        db::record_schema_version(conn)?;
        Ok(())
    })
}
