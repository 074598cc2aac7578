//! Store configuration loaded from `<root>/ledger.toml`.
//!
//! Every key is optional. A missing file means defaults; a malformed file is
//! an error rather than a silent fallback.

use crate::core::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "ledger.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file name, relative to the store root.
    pub database: String,
    /// How long a writer waits for the SQLite write lock.
    pub busy_timeout_ms: u64,
    /// Default `limit` for history queries.
    pub history_limit: usize,
    /// tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Actor recorded when the CLI is run without `--actor`.
    pub default_actor: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: "ledger.db".to_string(),
            busy_timeout_ms: 5_000,
            history_limit: 50,
            log_level: "warn".to_string(),
            default_actor: None,
        }
    }
}

impl LedgerConfig {
    pub fn parse(content: &str) -> Result<Self, LedgerError> {
        let config: LedgerConfig = toml::from_str(content)?;
        if config.database.trim().is_empty() {
            return Err(LedgerError::ValidationError(
                "ledger.toml: 'database' must not be empty".to_string(),
            ));
        }
        if config.busy_timeout_ms == 0 {
            return Err(LedgerError::ValidationError(
                "ledger.toml: 'busy_timeout_ms' must be at least 1".to_string(),
            ));
        }
        if config.history_limit == 0 {
            return Err(LedgerError::ValidationError(
                "ledger.toml: 'history_limit' must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Load `ledger.toml` from the store root.
pub fn load_config(root: &Path) -> Result<LedgerConfig, LedgerError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(LedgerConfig::default());
    }
    let content = fs::read_to_string(&config_path)?;
    LedgerConfig::parse(&content)
}
