//! Store handle for the ledger's state.
//!
//! A `Store` is a directory holding `ledger.toml` (optional) and the SQLite
//! database. Opening a store creates the directory and schema on first use;
//! opening it again is a no-op migration-wise.

use crate::core::broker::DbBroker;
use crate::core::config::{self, LedgerConfig};
use crate::core::error::LedgerError;
use crate::core::time::Stamp;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store handle representing one ledger workspace.
///
/// Cheap to clone; holds no connection. Every operation acquires its own
/// connection through [`Store::broker`].
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
    pub config: LedgerConfig,
}

impl Store {
    /// Open (and initialize if needed) the store rooted at `root`, reading
    /// `ledger.toml` when present.
    pub fn open(root: &Path) -> Result<Store, LedgerError> {
        fs::create_dir_all(root)?;
        let config = config::load_config(root)?;
        Self::open_with_config(root, config)
    }

    pub fn open_with_config(root: &Path, config: LedgerConfig) -> Result<Store, LedgerError> {
        fs::create_dir_all(root)?;
        let store = Store {
            root: root.to_path_buf(),
            config,
        };
        crate::subsystems::initialize_all_dbs(&store)?;
        Ok(store)
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(&self.config.database)
    }

    pub fn broker(&self) -> DbBroker {
        DbBroker::new(
            &self.db_path(),
            Duration::from_millis(self.config.busy_timeout_ms),
        )
    }

    /// Stamp for a mutation made now, by `actor` or the configured default.
    pub fn stamp(&self, actor: Option<&str>) -> Result<Stamp, LedgerError> {
        let actor = actor
            .or(self.config.default_actor.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                LedgerError::ValidationError(
                    "an actor is required (pass --actor or set default_actor in ledger.toml)"
                        .to_string(),
                )
            })?;
        Ok(Stamp::now(actor))
    }
}

/// What a natural-key upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Per-kind tally of upsert outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}
