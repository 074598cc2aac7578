//! Record kinds and the pipelines that fill them.

pub mod definitions;
pub mod history;
pub mod import;
pub mod ingest;
pub mod ladder;
pub mod mapping;
pub mod questions;
pub mod rubric;
