//! Scored rubric entries: one row per (discipline, level, stage, competency).
//!
//! Field edits never go through this module directly; they are routed through
//! [`crate::plugins::history`] so every change is recorded. What lives here is
//! the entry's own allow-list of editable fields, creation, bulk upsert for
//! imports, structural operations (stages, levels, disciplines), and reads.

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::{Store, UpsertOutcome};
use crate::core::time::{self, Stamp};
use crate::plugins::{definitions, questions};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENTITY: &str = "rubric";

const ENTRY_COLUMNS: &str = "id, discipline, level, stage, competency, score_1, score_2, score_3, score_4, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricEntry {
    pub id: String,
    pub discipline: String,
    pub level: String,
    pub stage: String,
    pub competency: String,
    pub score_1: String,
    pub score_2: String,
    pub score_3: String,
    pub score_4: String,
    pub created_at: String,
    pub updated_at: String,
}

impl RubricEntry {
    pub fn key(&self) -> RubricKey {
        RubricKey {
            discipline: self.discipline.clone(),
            level: self.level.clone(),
            stage: self.stage.clone(),
            competency: self.competency.clone(),
        }
    }
}

/// Natural key of a rubric entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RubricKey {
    pub discipline: String,
    pub level: String,
    pub stage: String,
    pub competency: String,
}

impl fmt::Display for RubricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.discipline, self.level, self.stage, self.competency
        )
    }
}

/// Canonical rubric entity as produced by ingestion or explicit creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRubricEntry {
    pub discipline: String,
    pub level: String,
    pub stage: String,
    pub competency: String,
    pub scores: [String; 4],
}

impl NewRubricEntry {
    pub fn key(&self) -> RubricKey {
        RubricKey {
            discipline: self.discipline.clone(),
            level: self.level.clone(),
            stage: self.stage.clone(),
            competency: self.competency.clone(),
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        for (name, value) in [
            ("discipline", &self.discipline),
            ("level", &self.level),
            ("stage", &self.stage),
            ("competency", &self.competency),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::ValidationError(format!(
                    "rubric entry requires a non-empty {}",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Fields of a rubric entry that may be edited after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RubricField {
    #[serde(rename = "score_1")]
    Score1,
    #[serde(rename = "score_2")]
    Score2,
    #[serde(rename = "score_3")]
    Score3,
    #[serde(rename = "score_4")]
    Score4,
    #[serde(rename = "stage")]
    Stage,
    #[serde(rename = "competency")]
    Competency,
}

impl RubricField {
    pub const ALL: [RubricField; 6] = [
        RubricField::Score1,
        RubricField::Score2,
        RubricField::Score3,
        RubricField::Score4,
        RubricField::Stage,
        RubricField::Competency,
    ];

    pub fn column(self) -> &'static str {
        match self {
            RubricField::Score1 => "score_1",
            RubricField::Score2 => "score_2",
            RubricField::Score3 => "score_3",
            RubricField::Score4 => "score_4",
            RubricField::Stage => "stage",
            RubricField::Competency => "competency",
        }
    }
}

impl FromStr for RubricField {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RubricField::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| LedgerError::InvalidField {
                entity: ENTITY.to_string(),
                field: s.to_string(),
            })
    }
}

impl fmt::Display for RubricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

pub fn initialize_rubric_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::RUBRIC_DB_SCHEMA_ENTRIES, [])?;
    conn.execute(schemas::RUBRIC_DB_SCHEMA_INDEX_DISCIPLINE, [])?;
    conn.execute(schemas::RUBRIC_DB_SCHEMA_INDEX_LEVEL, [])?;
    conn.execute(schemas::RUBRIC_DB_SCHEMA_INDEX_STAGE, [])?;
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<RubricEntry> {
    Ok(RubricEntry {
        id: row.get(0)?,
        discipline: row.get(1)?,
        level: row.get(2)?,
        stage: row.get(3)?,
        competency: row.get(4)?,
        score_1: row.get(5)?,
        score_2: row.get(6)?,
        score_3: row.get(7)?,
        score_4: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn query_entries(
    conn: &Connection,
    where_clause: &str,
    order_by: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<RubricEntry>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM rubric_entries WHERE {} ORDER BY {}",
        ENTRY_COLUMNS, where_clause, order_by
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, entry_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn get_entry_conn(conn: &Connection, id: &str) -> Result<Option<RubricEntry>, LedgerError> {
    let sql = format!("SELECT {} FROM rubric_entries WHERE id = ?1", ENTRY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], entry_from_row).optional()?)
}

fn get_entry_by_key_conn(
    conn: &Connection,
    key: &RubricKey,
) -> Result<Option<RubricEntry>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM rubric_entries
         WHERE discipline = ?1 AND level = ?2 AND stage = ?3 AND competency = ?4",
        ENTRY_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![key.discipline, key.level, key.stage, key.competency],
            entry_from_row,
        )
        .optional()?)
}

fn insert_entry(conn: &Connection, entry: &NewRubricEntry, ts: &str) -> Result<String, LedgerError> {
    let id = time::new_id();
    conn.execute(
        "INSERT INTO rubric_entries(id, discipline, level, stage, competency, score_1, score_2, score_3, score_4, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            entry.discipline,
            entry.level,
            entry.stage,
            entry.competency,
            entry.scores[0],
            entry.scores[1],
            entry.scores[2],
            entry.scores[3],
            ts
        ],
    )
    .map_err(|e| error::conflict_on_unique(e, || entry.key().to_string()))?;
    Ok(id)
}

/// Create a single entry. Fails with `ConflictError` if the natural key exists.
pub fn create_entry(
    store: &Store,
    entry: &NewRubricEntry,
    stamp: &Stamp,
) -> Result<RubricEntry, LedgerError> {
    entry.validate()?;
    store
        .broker()
        .with_tx(&stamp.actor, "rubric.create", |conn| {
            let id = insert_entry(conn, entry, &stamp.at)?;
            get_entry_conn(conn, &id)?
                .ok_or_else(|| LedgerError::NotFound(format!("rubric entry {}", id)))
        })
}

/// Insert-or-update on the natural key. Scores are overwritten on conflict;
/// a row whose scores already match is left untouched (no `updated_at` bump).
/// Never writes history.
pub fn upsert_entry(
    conn: &Connection,
    entry: &NewRubricEntry,
    ts: &str,
) -> Result<UpsertOutcome, LedgerError> {
    entry.validate()?;
    match get_entry_by_key_conn(conn, &entry.key())? {
        None => {
            insert_entry(conn, entry, ts)?;
            Ok(UpsertOutcome::Inserted)
        }
        Some(existing) => {
            let current = [
                &existing.score_1,
                &existing.score_2,
                &existing.score_3,
                &existing.score_4,
            ];
            if current.iter().zip(entry.scores.iter()).all(|(a, b)| *a == b) {
                return Ok(UpsertOutcome::Unchanged);
            }
            conn.execute(
                "UPDATE rubric_entries
                 SET score_1 = ?1, score_2 = ?2, score_3 = ?3, score_4 = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    entry.scores[0],
                    entry.scores[1],
                    entry.scores[2],
                    entry.scores[3],
                    ts,
                    existing.id
                ],
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

pub fn get_entry(store: &Store, id: &str) -> Result<Option<RubricEntry>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "rubric.get", |conn| get_entry_conn(conn, id))
}

pub fn get_entry_by_key(store: &Store, key: &RubricKey) -> Result<Option<RubricEntry>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "rubric.get_by_key", |conn| {
            get_entry_by_key_conn(conn, key)
        })
}

pub fn list_by_discipline(store: &Store, discipline: &str) -> Result<Vec<RubricEntry>, LedgerError> {
    store.broker().with_conn("ledger", "rubric.list", |conn| {
        query_entries(
            conn,
            "discipline = ?1",
            "level, stage, competency",
            &[&discipline],
        )
    })
}

pub fn list_by_level(
    store: &Store,
    discipline: &str,
    level: &str,
) -> Result<Vec<RubricEntry>, LedgerError> {
    store.broker().with_conn("ledger", "rubric.list_level", |conn| {
        query_entries(
            conn,
            "discipline = ?1 AND level = ?2",
            "stage, competency",
            &[&discipline, &level],
        )
    })
}

pub fn list_by_stage(
    store: &Store,
    discipline: &str,
    stage: &str,
) -> Result<Vec<RubricEntry>, LedgerError> {
    store.broker().with_conn("ledger", "rubric.list_stage", |conn| {
        query_entries(
            conn,
            "discipline = ?1 AND stage = ?2",
            "level, competency",
            &[&discipline, &stage],
        )
    })
}

/// Delete one entry. Its change records stay behind as soft orphans.
pub fn delete_entry(store: &Store, id: &str, actor: &str) -> Result<(), LedgerError> {
    store.broker().with_tx(actor, "rubric.delete", |conn| {
        let n = conn.execute("DELETE FROM rubric_entries WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!("rubric entry {}", id)));
        }
        Ok(())
    })
}

fn distinct(
    conn: &Connection,
    column: &str,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<String>, LedgerError> {
    let sql = format!(
        "SELECT DISTINCT {col} FROM rubric_entries WHERE {w} ORDER BY {col}",
        col = column,
        w = where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn disciplines(store: &Store) -> Result<Vec<String>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "rubric.disciplines", |conn| {
            distinct(conn, "discipline", "1 = 1", &[])
        })
}

pub fn levels(store: &Store, discipline: &str) -> Result<Vec<String>, LedgerError> {
    store.broker().with_conn("ledger", "rubric.levels", |conn| {
        distinct(conn, "level", "discipline = ?1", &[&discipline])
    })
}

pub fn stages(store: &Store, discipline: &str) -> Result<Vec<String>, LedgerError> {
    store.broker().with_conn("ledger", "rubric.stages", |conn| {
        distinct(conn, "stage", "discipline = ?1", &[&discipline])
    })
}

pub fn competencies(
    store: &Store,
    discipline: &str,
    stage: Option<&str>,
) -> Result<Vec<String>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "rubric.competencies", |conn| match stage {
            Some(s) => distinct(
                conn,
                "competency",
                "discipline = ?1 AND stage = ?2",
                &[&discipline, &s],
            ),
            None => distinct(conn, "competency", "discipline = ?1", &[&discipline]),
        })
}

fn empty_entry(discipline: &str, level: &str, stage: &str, competency: &str) -> NewRubricEntry {
    NewRubricEntry {
        discipline: discipline.to_string(),
        level: level.to_string(),
        stage: stage.to_string(),
        competency: competency.to_string(),
        scores: Default::default(),
    }
}

/// Add a stage with the given competencies to every level the discipline
/// already has. Keys that already exist are skipped. Returns the number of
/// entries created.
pub fn add_stage(
    store: &Store,
    discipline: &str,
    stage: &str,
    competencies: &[String],
    stamp: &Stamp,
) -> Result<usize, LedgerError> {
    if stage.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "stage name is required".to_string(),
        ));
    }
    store.broker().with_tx(&stamp.actor, "rubric.add_stage", |conn| {
        let levels = distinct(conn, "level", "discipline = ?1", &[&discipline])?;
        if levels.is_empty() {
            return Err(LedgerError::ValidationError(format!(
                "discipline '{}' has no levels; add a level first",
                discipline
            )));
        }
        let mut created = 0;
        for level in &levels {
            for competency in competencies {
                let entry = empty_entry(discipline, level, stage, competency);
                entry.validate()?;
                if get_entry_by_key_conn(conn, &entry.key())?.is_none() {
                    insert_entry(conn, &entry, &stamp.at)?;
                    created += 1;
                }
            }
        }
        Ok(created)
    })
}

fn stage_competency_grid(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<(String, String)>, LedgerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Add a level to a discipline with empty scores. The stage/competency grid is
/// copied from `copy_from` when given, otherwise from every combination the
/// discipline already uses. Fails with `ConflictError` if the level exists.
pub fn add_level(
    store: &Store,
    discipline: &str,
    level: &str,
    copy_from: Option<&str>,
    stamp: &Stamp,
) -> Result<usize, LedgerError> {
    if level.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "level name is required".to_string(),
        ));
    }
    store.broker().with_tx(&stamp.actor, "rubric.add_level", |conn| {
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rubric_entries WHERE discipline = ?1 AND level = ?2",
            params![discipline, level],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(LedgerError::ConflictError(format!(
                "level '{}' already exists in {}",
                level, discipline
            )));
        }

        let grid = match copy_from {
            Some(src) => stage_competency_grid(
                conn,
                "SELECT stage, competency FROM rubric_entries
                 WHERE discipline = ?1 AND level = ?2 ORDER BY stage, competency",
                &[&discipline, &src],
            )?,
            None => stage_competency_grid(
                conn,
                "SELECT DISTINCT stage, competency FROM rubric_entries
                 WHERE discipline = ?1 ORDER BY stage, competency",
                &[&discipline],
            )?,
        };

        for (stage, competency) in &grid {
            insert_entry(conn, &empty_entry(discipline, level, stage, competency), &stamp.at)?;
        }
        Ok(grid.len())
    })
}

/// Delete every entry of a stage. `NotFound` when nothing matched.
pub fn delete_stage(
    store: &Store,
    discipline: &str,
    stage: &str,
    actor: &str,
) -> Result<usize, LedgerError> {
    store.broker().with_tx(actor, "rubric.delete_stage", |conn| {
        let n = conn.execute(
            "DELETE FROM rubric_entries WHERE discipline = ?1 AND stage = ?2",
            params![discipline, stage],
        )?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!(
                "stage '{}' in {}",
                stage, discipline
            )));
        }
        Ok(n)
    })
}

/// Delete every entry of a level. `NotFound` when nothing matched.
pub fn delete_level(
    store: &Store,
    discipline: &str,
    level: &str,
    actor: &str,
) -> Result<usize, LedgerError> {
    store.broker().with_tx(actor, "rubric.delete_level", |conn| {
        let n = conn.execute(
            "DELETE FROM rubric_entries WHERE discipline = ?1 AND level = ?2",
            params![discipline, level],
        )?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!(
                "level '{}' in {}",
                level, discipline
            )));
        }
        Ok(n)
    })
}

pub const PLACEHOLDER_LEVEL: &str = "Default Role";
pub const PLACEHOLDER_STAGE: &str = "General";
pub const PLACEHOLDER_COMPETENCY: &str = "General";

/// Start a discipline with one placeholder `General/General` entry per level,
/// or a single `Default Role` level when none are given. `ConflictError` if the
/// discipline already has rubric entries.
pub fn create_discipline(
    store: &Store,
    discipline: &str,
    levels: &[String],
    stamp: &Stamp,
) -> Result<Vec<RubricEntry>, LedgerError> {
    if discipline.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "discipline name is required".to_string(),
        ));
    }
    let levels: Vec<&str> = if levels.is_empty() {
        vec![PLACEHOLDER_LEVEL]
    } else {
        levels.iter().map(String::as_str).collect()
    };
    store
        .broker()
        .with_tx(&stamp.actor, "rubric.create_discipline", |conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM rubric_entries WHERE discipline = ?1",
                params![discipline],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Err(LedgerError::ConflictError(format!(
                    "discipline '{}' already exists",
                    discipline
                )));
            }
            for level in &levels {
                let entry =
                    empty_entry(discipline, level, PLACEHOLDER_STAGE, PLACEHOLDER_COMPETENCY);
                entry.validate()?;
                insert_entry(conn, &entry, &stamp.at)?;
            }
            query_entries(
                conn,
                "discipline = ?1",
                "level, stage, competency",
                &[&discipline],
            )
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineDeletion {
    pub rubric_entries: usize,
    pub definitions: usize,
    pub questions: usize,
}

/// Remove a discipline's rubric entries, competency definitions and questions
/// in one transaction. Ladder entries and mappings are left alone.
pub fn delete_discipline(
    store: &Store,
    discipline: &str,
    actor: &str,
) -> Result<DisciplineDeletion, LedgerError> {
    store
        .broker()
        .with_tx(actor, "rubric.delete_discipline", |conn| {
            let rubric_entries = conn.execute(
                "DELETE FROM rubric_entries WHERE discipline = ?1",
                params![discipline],
            )?;
            if rubric_entries == 0 {
                return Err(LedgerError::NotFound(format!("discipline {}", discipline)));
            }
            Ok(DisciplineDeletion {
                rubric_entries,
                definitions: definitions::delete_for_discipline(conn, discipline)?,
                questions: questions::delete_for_discipline(conn, discipline)?,
            })
        })
}
