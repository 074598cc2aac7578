//! Centralized database schema definitions.
//!
//! Everything lives in one SQLite file (`ledger.db` by default):
//! 1. rubric_entries / ladder_entries: the scored and descriptive records.
//! 2. change_history: append-only audit trail for field edits.
//! 3. competency_mappings: hiring competency <-> ladder facet links.
//! 4. competency_definitions / questions: imported reference material.
//!
//! change_history deliberately has no foreign key: a record outlives the
//! entry it points at.

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

// --- Rubric entries ---
pub const RUBRIC_DB_SCHEMA_ENTRIES: &str = "
    CREATE TABLE IF NOT EXISTS rubric_entries (
        id TEXT PRIMARY KEY,
        discipline TEXT NOT NULL,
        level TEXT NOT NULL,
        stage TEXT NOT NULL,
        competency TEXT NOT NULL,
        score_1 TEXT NOT NULL DEFAULT '',
        score_2 TEXT NOT NULL DEFAULT '',
        score_3 TEXT NOT NULL DEFAULT '',
        score_4 TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(discipline, level, stage, competency)
    )
";
pub const RUBRIC_DB_SCHEMA_INDEX_DISCIPLINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_rubric_discipline ON rubric_entries(discipline)";
pub const RUBRIC_DB_SCHEMA_INDEX_LEVEL: &str =
    "CREATE INDEX IF NOT EXISTS idx_rubric_level ON rubric_entries(discipline, level)";
pub const RUBRIC_DB_SCHEMA_INDEX_STAGE: &str =
    "CREATE INDEX IF NOT EXISTS idx_rubric_stage ON rubric_entries(discipline, stage)";

// --- Ladder entries ---
pub const LADDER_DB_SCHEMA_ENTRIES: &str = "
    CREATE TABLE IF NOT EXISTS ladder_entries (
        id TEXT PRIMARY KEY,
        discipline TEXT NOT NULL,
        level TEXT NOT NULL,
        facet TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(discipline, level, facet)
    )
";
pub const LADDER_DB_SCHEMA_INDEX_DISCIPLINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_ladder_discipline ON ladder_entries(discipline)";
pub const LADDER_DB_SCHEMA_INDEX_FACET: &str =
    "CREATE INDEX IF NOT EXISTS idx_ladder_facet ON ladder_entries(discipline, facet)";
pub const LADDER_DB_SCHEMA_INDEX_LEVEL: &str =
    "CREATE INDEX IF NOT EXISTS idx_ladder_level ON ladder_entries(discipline, level)";

// --- Change history ---
pub const HISTORY_DB_SCHEMA_CHANGES: &str = "
    CREATE TABLE IF NOT EXISTS change_history (
        id TEXT PRIMARY KEY,
        entity TEXT NOT NULL,
        entry_id TEXT NOT NULL,
        field TEXT NOT NULL,
        old_value TEXT NOT NULL,
        new_value TEXT NOT NULL,
        actor TEXT NOT NULL,
        changed_at TEXT NOT NULL
    )
";
pub const HISTORY_DB_SCHEMA_INDEX_ENTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_history_entry ON change_history(entry_id)";
pub const HISTORY_DB_SCHEMA_INDEX_CHANGED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_history_changed_at ON change_history(changed_at)";

// --- Competency mappings ---
pub const MAPPING_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS competency_mappings (
        id TEXT PRIMARY KEY,
        discipline TEXT NOT NULL,
        hiring_competency TEXT NOT NULL,
        ladder_facet TEXT NOT NULL,
        relationship_type TEXT NOT NULL DEFAULT 'direct',
        notes TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(discipline, hiring_competency, ladder_facet)
    )
";
pub const MAPPING_DB_SCHEMA_INDEX_DISCIPLINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_mappings_discipline ON competency_mappings(discipline)";
pub const MAPPING_DB_SCHEMA_INDEX_HIRING: &str = "CREATE INDEX IF NOT EXISTS idx_mappings_hiring ON competency_mappings(discipline, hiring_competency)";
pub const MAPPING_DB_SCHEMA_INDEX_FACET: &str =
    "CREATE INDEX IF NOT EXISTS idx_mappings_facet ON competency_mappings(discipline, ladder_facet)";

// --- Competency definitions ---
pub const DEFINITIONS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS competency_definitions (
        id TEXT PRIMARY KEY,
        discipline TEXT NOT NULL,
        competency TEXT NOT NULL,
        definition TEXT NOT NULL DEFAULT '',
        source TEXT NOT NULL DEFAULT 'manual',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(discipline, competency)
    )
";

// --- Questions ---
pub const QUESTIONS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS questions (
        id TEXT PRIMARY KEY,
        discipline TEXT NOT NULL,
        stage TEXT NOT NULL,
        competency TEXT NOT NULL,
        question TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(discipline, stage, competency, question)
    )
";
pub const QUESTIONS_DB_SCHEMA_INDEX_DISCIPLINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_questions_discipline ON questions(discipline, stage)";
