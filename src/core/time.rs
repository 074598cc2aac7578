//! Timestamp, id, and actor helpers.
//!
//! The store never reads a clock on its own: every mutating operation takes a
//! [`Stamp`] from its caller. The CLI builds one with [`Stamp::now`].

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Who performed a mutation, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub actor: String,
    pub at: String,
}

impl Stamp {
    pub fn new(actor: impl Into<String>, at: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            at: at.into(),
        }
    }

    pub fn now(actor: impl Into<String>) -> Self {
        Self::new(actor, now_epoch_z())
    }

    /// Actor label recorded on history entries written by a revert.
    pub fn revert_actor(&self) -> String {
        format!("{} (revert)", self.actor)
    }
}
