//! Career-ladder entries: one description per (discipline, level, facet).

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::{Store, UpsertOutcome};
use crate::core::time::{self, Stamp};
use crate::plugins::history;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENTITY: &str = "ladder";

const ENTRY_COLUMNS: &str = "id, discipline, level, facet, description, created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub id: String,
    pub discipline: String,
    pub level: String,
    pub facet: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LadderKey {
    pub discipline: String,
    pub level: String,
    pub facet: String,
}

impl fmt::Display for LadderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.discipline, self.level, self.facet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLadderEntry {
    pub discipline: String,
    pub level: String,
    pub facet: String,
    pub description: String,
}

impl NewLadderEntry {
    pub fn key(&self) -> LadderKey {
        LadderKey {
            discipline: self.discipline.clone(),
            level: self.level.clone(),
            facet: self.facet.clone(),
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        for (name, value) in [
            ("discipline", &self.discipline),
            ("level", &self.level),
            ("facet", &self.facet),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::ValidationError(format!(
                    "ladder entry requires a non-empty {}",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Fields of a ladder entry that may be edited after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderField {
    Description,
    Facet,
    Level,
}

impl LadderField {
    pub const ALL: [LadderField; 3] = [
        LadderField::Description,
        LadderField::Facet,
        LadderField::Level,
    ];

    pub fn column(self) -> &'static str {
        match self {
            LadderField::Description => "description",
            LadderField::Facet => "facet",
            LadderField::Level => "level",
        }
    }
}

impl FromStr for LadderField {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LadderField::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| LedgerError::InvalidField {
                entity: ENTITY.to_string(),
                field: s.to_string(),
            })
    }
}

impl fmt::Display for LadderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

pub fn initialize_ladder_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::LADDER_DB_SCHEMA_ENTRIES, [])?;
    conn.execute(schemas::LADDER_DB_SCHEMA_INDEX_DISCIPLINE, [])?;
    conn.execute(schemas::LADDER_DB_SCHEMA_INDEX_FACET, [])?;
    conn.execute(schemas::LADDER_DB_SCHEMA_INDEX_LEVEL, [])?;
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LadderEntry> {
    Ok(LadderEntry {
        id: row.get(0)?,
        discipline: row.get(1)?,
        level: row.get(2)?,
        facet: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_entries(
    conn: &Connection,
    where_clause: &str,
    order_by: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<LadderEntry>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM ladder_entries WHERE {} ORDER BY {}",
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

pub fn get_entry_conn(conn: &Connection, id: &str) -> Result<Option<LadderEntry>, LedgerError> {
    let sql = format!("SELECT {} FROM ladder_entries WHERE id = ?1", ENTRY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], entry_from_row).optional()?)
}

fn get_entry_by_key_conn(
    conn: &Connection,
    key: &LadderKey,
) -> Result<Option<LadderEntry>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM ladder_entries WHERE discipline = ?1 AND level = ?2 AND facet = ?3",
        ENTRY_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![key.discipline, key.level, key.facet],
            entry_from_row,
        )
        .optional()?)
}

/// Insert-or-update on (discipline, level, facet); the description is
/// overwritten on conflict. Never writes history; used by ingestion.
pub fn upsert_entry(
    conn: &Connection,
    entry: &NewLadderEntry,
    ts: &str,
) -> Result<UpsertOutcome, LedgerError> {
    entry.validate()?;
    match get_entry_by_key_conn(conn, &entry.key())? {
        None => {
            conn.execute(
                "INSERT INTO ladder_entries(id, discipline, level, facet, description, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    time::new_id(),
                    entry.discipline,
                    entry.level,
                    entry.facet,
                    entry.description,
                    ts
                ],
            )
            .map_err(|e| error::conflict_on_unique(e, || entry.key().to_string()))?;
            Ok(UpsertOutcome::Inserted)
        }
        Some(existing) if existing.description == entry.description => {
            Ok(UpsertOutcome::Unchanged)
        }
        Some(existing) => {
            conn.execute(
                "UPDATE ladder_entries SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![entry.description, ts, existing.id],
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Create one ladder cell, or change the description of an existing one.
///
/// A changed description on an existing cell is written through the change
/// log like any other edit; an identical save writes nothing.
pub fn save_entry(
    store: &Store,
    entry: &NewLadderEntry,
    stamp: &Stamp,
) -> Result<LadderEntry, LedgerError> {
    entry.validate()?;
    store.broker().with_tx(&stamp.actor, "ladder.save", |conn| {
        let key = entry.key();
        match get_entry_by_key_conn(conn, &key)? {
            None => {
                upsert_entry(conn, entry, &stamp.at)?;
            }
            Some(existing) if existing.description == entry.description => return Ok(existing),
            Some(existing) => {
                let record = history::change_field_conn(
                    conn,
                    &existing.id,
                    LadderField::Description.into(),
                    &entry.description,
                    stamp,
                )?;
                tracing::info!(entry_id = %existing.id, history_id = %record.id, "ladder description changed");
            }
        }
        get_entry_by_key_conn(conn, &key)?
            .ok_or_else(|| LedgerError::NotFound(format!("ladder entry {}", key)))
    })
}

pub fn get_entry(store: &Store, id: &str) -> Result<Option<LadderEntry>, LedgerError> {
    store
        .broker()
        .with_conn("ledger", "ladder.get", |conn| get_entry_conn(conn, id))
}

pub fn list_by_discipline(store: &Store, discipline: &str) -> Result<Vec<LadderEntry>, LedgerError> {
    store.broker().with_conn("ledger", "ladder.list", |conn| {
        query_entries(conn, "discipline = ?1", "facet, level", &[&discipline])
    })
}

pub fn list_by_facet(
    store: &Store,
    discipline: &str,
    facet: &str,
) -> Result<Vec<LadderEntry>, LedgerError> {
    store.broker().with_conn("ledger", "ladder.list_facet", |conn| {
        query_entries(
            conn,
            "discipline = ?1 AND facet = ?2",
            "level",
            &[&discipline, &facet],
        )
    })
}

pub fn list_by_level(
    store: &Store,
    discipline: &str,
    level: &str,
) -> Result<Vec<LadderEntry>, LedgerError> {
    store.broker().with_conn("ledger", "ladder.list_level", |conn| {
        query_entries(
            conn,
            "discipline = ?1 AND level = ?2",
            "facet",
            &[&discipline, &level],
        )
    })
}

pub fn delete_entry(store: &Store, id: &str, actor: &str) -> Result<(), LedgerError> {
    store.broker().with_tx(actor, "ladder.delete", |conn| {
        let n = conn.execute("DELETE FROM ladder_entries WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!("ladder entry {}", id)));
        }
        Ok(())
    })
}

fn first_column(row: &Row<'_>) -> rusqlite::Result<String> {
    row.get(0)
}

fn distinct(
    store: &Store,
    op: &str,
    column: &str,
    discipline: Option<&str>,
) -> Result<Vec<String>, LedgerError> {
    store.broker().with_conn("ledger", op, |conn| {
        let sql = match discipline {
            Some(_) => format!(
                "SELECT DISTINCT {c} FROM ladder_entries WHERE discipline = ?1 ORDER BY {c}",
                c = column
            ),
            None => format!("SELECT DISTINCT {c} FROM ladder_entries ORDER BY {c}", c = column),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = match discipline {
            Some(d) => stmt.query_map(params![d], first_column)?,
            None => stmt.query_map([], first_column)?,
        };
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn facets(store: &Store, discipline: &str) -> Result<Vec<String>, LedgerError> {
    distinct(store, "ladder.facets", "facet", Some(discipline))
}

pub fn levels(store: &Store, discipline: &str) -> Result<Vec<String>, LedgerError> {
    distinct(store, "ladder.levels", "level", Some(discipline))
}

pub fn disciplines(store: &Store) -> Result<Vec<String>, LedgerError> {
    distinct(store, "ladder.disciplines", "discipline", None)
}
