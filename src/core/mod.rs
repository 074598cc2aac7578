//! Shared primitives for the ledger: storage access, errors, configuration,
//! logging and output helpers.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
