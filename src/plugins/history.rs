//! Audit log for field edits on rubric and ladder entries.
//!
//! Every edit runs read-current, write-new, append-record inside one
//! IMMEDIATE transaction, so the recorded `old_value` is always the value the
//! write actually replaced. Reverts are ordinary edits with a new record; no
//! record is ever updated or deleted.

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time::{self, Stamp};
use crate::plugins::ladder::{self, LadderField};
use crate::plugins::rubric::{self, RubricField};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which entry table a change record points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Rubric,
    Ladder,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Rubric => rubric::ENTITY,
            EntityKind::Ladder => ladder::ENTITY,
        }
    }

    fn table(self) -> &'static str {
        match self {
            EntityKind::Rubric => "rubric_entries",
            EntityKind::Ladder => "ladder_entries",
        }
    }
}

impl FromStr for EntityKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rubric" => Ok(EntityKind::Rubric),
            "ladder" => Ok(EntityKind::Ladder),
            other => Err(LedgerError::ValidationError(format!(
                "unknown entity kind '{}' (expected rubric|ladder)",
                other
            ))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field that passed its entity's allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Rubric(RubricField),
    Ladder(LadderField),
}

impl EditableField {
    /// Resolve `name` against the allow-list of `kind`. Each entity owns its
    /// own list; a rubric field name is not valid for a ladder entry and vice
    /// versa.
    pub fn parse(kind: EntityKind, name: &str) -> Result<Self, LedgerError> {
        match kind {
            EntityKind::Rubric => name.parse::<RubricField>().map(EditableField::Rubric),
            EntityKind::Ladder => name.parse::<LadderField>().map(EditableField::Ladder),
        }
    }

    pub fn kind(self) -> EntityKind {
        match self {
            EditableField::Rubric(_) => EntityKind::Rubric,
            EditableField::Ladder(_) => EntityKind::Ladder,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            EditableField::Rubric(f) => f.column(),
            EditableField::Ladder(f) => f.column(),
        }
    }
}

impl From<RubricField> for EditableField {
    fn from(f: RubricField) -> Self {
        EditableField::Rubric(f)
    }
}

impl From<LadderField> for EditableField {
    fn from(f: LadderField) -> Self {
        EditableField::Ladder(f)
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    pub entity: EntityKind,
    pub entry_id: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub actor: String,
    pub changed_at: String,
}

/// Filters for [`query_history`]. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub entry_id: Option<String>,
    pub discipline: Option<String>,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            entry_id: None,
            discipline: None,
            limit,
        }
    }

    pub fn for_entry(entry_id: &str, limit: usize) -> Self {
        Self {
            entry_id: Some(entry_id.to_string()),
            discipline: None,
            limit,
        }
    }

    pub fn for_discipline(discipline: &str, limit: usize) -> Self {
        Self {
            entry_id: None,
            discipline: Some(discipline.to_string()),
            limit,
        }
    }
}

pub fn initialize_history_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::HISTORY_DB_SCHEMA_CHANGES, [])?;
    conn.execute(schemas::HISTORY_DB_SCHEMA_INDEX_ENTRY, [])?;
    conn.execute(schemas::HISTORY_DB_SCHEMA_INDEX_CHANGED_AT, [])?;
    Ok(())
}

const RECORD_COLUMNS: &str =
    "h.id, h.entity, h.entry_id, h.field, h.old_value, h.new_value, h.actor, h.changed_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeRecord> {
    let entity: String = row.get(1)?;
    let entity = entity.parse::<EntityKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ChangeRecord {
        id: row.get(0)?,
        entity,
        entry_id: row.get(2)?,
        field: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        actor: row.get(6)?,
        changed_at: row.get(7)?,
    })
}

fn read_current(
    conn: &Connection,
    field: EditableField,
    entry_id: &str,
) -> Result<Option<String>, LedgerError> {
    // Table and column come from closed enums, never from caller text.
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        field.column(),
        field.kind().table()
    );
    Ok(conn
        .query_row(&sql, params![entry_id], |row| row.get(0))
        .optional()?)
}

fn write_field(
    conn: &Connection,
    field: EditableField,
    entry_id: &str,
    value: &str,
    ts: &str,
) -> Result<(), LedgerError> {
    let sql = format!(
        "UPDATE {} SET {} = ?1, updated_at = ?2 WHERE id = ?3",
        field.kind().table(),
        field.column()
    );
    conn.execute(&sql, params![value, ts, entry_id])
        .map_err(|e| {
            error::conflict_on_unique(e, || {
                format!(
                    "{} entry {} cannot take {}='{}'",
                    field.kind(),
                    entry_id,
                    field.column(),
                    value
                )
            })
        })?;
    Ok(())
}

fn append_record(conn: &Connection, record: &ChangeRecord) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO change_history(id, entity, entry_id, field, old_value, new_value, actor, changed_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.entity.as_str(),
            record.entry_id,
            record.field,
            record.old_value,
            record.new_value,
            record.actor,
            record.changed_at
        ],
    )?;
    Ok(())
}

fn get_record_conn(conn: &Connection, id: &str) -> Result<Option<ChangeRecord>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM change_history h WHERE h.id = ?1",
        RECORD_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![id], record_from_row)
        .optional()?)
}

/// Set one allow-listed field and append exactly one change record, atomically.
///
/// `field` is checked against the entity's allow-list before the store is
/// touched. Fails with `InvalidField`, `NotFound` for an unknown entry, or
/// `ConflictError` when the new value would collide with another entry's
/// natural key.
pub fn apply_field_change(
    store: &Store,
    kind: EntityKind,
    entry_id: &str,
    field: &str,
    new_value: &str,
    stamp: &Stamp,
) -> Result<ChangeRecord, LedgerError> {
    let field = EditableField::parse(kind, field)?;
    apply_change(store, entry_id, field, new_value, stamp)
}

/// Typed form of [`apply_field_change`].
pub fn apply_change(
    store: &Store,
    entry_id: &str,
    field: EditableField,
    new_value: &str,
    stamp: &Stamp,
) -> Result<ChangeRecord, LedgerError> {
    if matches!(
        field,
        EditableField::Rubric(RubricField::Stage | RubricField::Competency)
            | EditableField::Ladder(LadderField::Facet | LadderField::Level)
    ) && new_value.trim().is_empty()
    {
        return Err(LedgerError::ValidationError(format!(
            "{} is part of the natural key and cannot be empty",
            field.column()
        )));
    }

    let record = store
        .broker()
        .with_tx(&stamp.actor, "history.apply", |conn| {
            change_field_conn(conn, entry_id, field, new_value, stamp)
        })?;

    tracing::info!(
        entity = %record.entity,
        entry_id = %record.entry_id,
        field = %record.field,
        actor = %record.actor,
        history_id = %record.id,
        "field change recorded"
    );
    Ok(record)
}

/// Read, write and record one field change on a caller-held transaction.
pub(crate) fn change_field_conn(
    conn: &Connection,
    entry_id: &str,
    field: EditableField,
    new_value: &str,
    stamp: &Stamp,
) -> Result<ChangeRecord, LedgerError> {
    let old_value = read_current(conn, field, entry_id)?
        .ok_or_else(|| LedgerError::NotFound(format!("{} entry {}", field.kind(), entry_id)))?;
    write_field(conn, field, entry_id, new_value, &stamp.at)?;
    let record = ChangeRecord {
        id: time::new_id(),
        entity: field.kind(),
        entry_id: entry_id.to_string(),
        field: field.column().to_string(),
        old_value,
        new_value: new_value.to_string(),
        actor: stamp.actor.clone(),
        changed_at: stamp.at.clone(),
    };
    append_record(conn, &record)?;
    Ok(record)
}

/// Restore the value a record replaced, as a new edit with its own record.
///
/// The value overwritten is whatever the field holds now, which may differ
/// from `record.new_value` if later edits happened. Fails with `NotFound` for
/// an unknown record and `RevertError` when the entry has since been deleted.
pub fn revert(store: &Store, history_id: &str, stamp: &Stamp) -> Result<ChangeRecord, LedgerError> {
    let record = store
        .broker()
        .with_tx(&stamp.actor, "history.revert", |conn| {
            let target = get_record_conn(conn, history_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("history record {}", history_id)))?;
            let field = EditableField::parse(target.entity, &target.field)?;

            let current = read_current(conn, field, &target.entry_id)?.ok_or_else(|| {
                LedgerError::RevertError(format!(
                    "{} entry {} no longer exists",
                    target.entity, target.entry_id
                ))
            })?;

            write_field(conn, field, &target.entry_id, &target.old_value, &stamp.at)?;
            let record = ChangeRecord {
                id: time::new_id(),
                entity: target.entity,
                entry_id: target.entry_id.clone(),
                field: target.field.clone(),
                old_value: current,
                new_value: target.old_value.clone(),
                actor: stamp.revert_actor(),
                changed_at: stamp.at.clone(),
            };
            append_record(conn, &record)?;
            Ok(record)
        })?;

    tracing::info!(
        reverted = history_id,
        history_id = %record.id,
        entry_id = %record.entry_id,
        field = %record.field,
        actor = %record.actor,
        "change reverted"
    );
    Ok(record)
}

pub fn get_record(store: &Store, id: &str) -> Result<Option<ChangeRecord>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "history.get", |conn| get_record_conn(conn, id))
}

/// Change records, newest first. With a discipline filter the owning entry is
/// joined at query time, so records of deleted entries drop out of
/// discipline-scoped results; they remain visible by entry id and unscoped.
pub fn query_history(store: &Store, query: &HistoryQuery) -> Result<Vec<ChangeRecord>, LedgerError> {
    if query.limit == 0 {
        return Ok(Vec::new());
    }
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    store.broker().with_conn("ledger", "history.query", |conn| {
        let sql = format!(
            "SELECT {cols} FROM change_history h
             LEFT JOIN rubric_entries r ON h.entity = 'rubric' AND r.id = h.entry_id
             LEFT JOIN ladder_entries l ON h.entity = 'ladder' AND l.id = h.entry_id
             WHERE (?1 IS NULL OR h.entry_id = ?1)
               AND (?2 IS NULL OR COALESCE(r.discipline, l.discipline) = ?2)
             ORDER BY h.changed_at DESC, h.rowid DESC
             LIMIT ?3",
            cols = RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![query.entry_id, query.discipline, limit],
            record_from_row,
        )?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}
