//! Competency definitions: one text per (discipline, competency).

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::{Store, UpsertOutcome};
use crate::core::time::{self, Stamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a definition's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSource {
    DescriptionColumn,
    /// No "description" header was found; column 2 was taken as a guess.
    PositionalFallback,
    Manual,
}

impl DefinitionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DefinitionSource::DescriptionColumn => "description_column",
            DefinitionSource::PositionalFallback => "positional_fallback",
            DefinitionSource::Manual => "manual",
        }
    }
}

impl FromStr for DefinitionSource {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "description_column" => Ok(DefinitionSource::DescriptionColumn),
            "positional_fallback" => Ok(DefinitionSource::PositionalFallback),
            "manual" => Ok(DefinitionSource::Manual),
            other => Err(LedgerError::ValidationError(format!(
                "unknown definition source '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DefinitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyDefinition {
    pub id: String,
    pub discipline: String,
    pub competency: String,
    pub definition: String,
    pub source: DefinitionSource,
    pub created_at: String,
    pub updated_at: String,
}

impl CompetencyDefinition {
    pub fn low_confidence(&self) -> bool {
        self.source == DefinitionSource::PositionalFallback
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDefinition {
    pub discipline: String,
    pub competency: String,
    pub definition: String,
    pub source: DefinitionSource,
}

const DEFINITION_COLUMNS: &str =
    "id, discipline, competency, definition, source, created_at, updated_at";

pub fn initialize_definitions_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::DEFINITIONS_DB_SCHEMA, [])?;
    Ok(())
}

fn definition_from_row(row: &Row<'_>) -> rusqlite::Result<CompetencyDefinition> {
    let source: String = row.get(4)?;
    let source = source.parse::<DefinitionSource>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(CompetencyDefinition {
        id: row.get(0)?,
        discipline: row.get(1)?,
        competency: row.get(2)?,
        definition: row.get(3)?,
        source,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn get_by_key_conn(
    conn: &Connection,
    discipline: &str,
    competency: &str,
) -> Result<Option<CompetencyDefinition>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM competency_definitions WHERE discipline = ?1 AND competency = ?2",
        DEFINITION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![discipline, competency], definition_from_row)
        .optional()?)
}

/// Insert-or-update on (discipline, competency); text and source are
/// overwritten on conflict.
pub fn upsert_definition(
    conn: &Connection,
    def: &NewDefinition,
    ts: &str,
) -> Result<UpsertOutcome, LedgerError> {
    if def.discipline.trim().is_empty() || def.competency.trim().is_empty() {
        return Err(LedgerError::ValidationError(
            "definition requires a discipline and a competency".to_string(),
        ));
    }
    match get_by_key_conn(conn, &def.discipline, &def.competency)? {
        None => {
            conn.execute(
                "INSERT INTO competency_definitions(id, discipline, competency, definition, source, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    time::new_id(),
                    def.discipline,
                    def.competency,
                    def.definition,
                    def.source.as_str(),
                    ts
                ],
            )
            .map_err(|e| {
                error::conflict_on_unique(e, || format!("{}/{}", def.discipline, def.competency))
            })?;
            Ok(UpsertOutcome::Inserted)
        }
        Some(existing) if existing.definition == def.definition && existing.source == def.source => {
            Ok(UpsertOutcome::Unchanged)
        }
        Some(existing) => {
            conn.execute(
                "UPDATE competency_definitions SET definition = ?1, source = ?2, updated_at = ?3 WHERE id = ?4",
                params![def.definition, def.source.as_str(), ts, existing.id],
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Hand-entered definition; always stored with the `manual` source.
pub fn save_definition(
    store: &Store,
    discipline: &str,
    competency: &str,
    definition: &str,
    stamp: &Stamp,
) -> Result<CompetencyDefinition, LedgerError> {
    let def = NewDefinition {
        discipline: discipline.to_string(),
        competency: competency.to_string(),
        definition: definition.to_string(),
        source: DefinitionSource::Manual,
    };
    store
        .broker()
        .with_tx(&stamp.actor, "definitions.save", |conn| {
            upsert_definition(conn, &def, &stamp.at)?;
            get_by_key_conn(conn, discipline, competency)?.ok_or_else(|| {
                LedgerError::NotFound(format!("definition {}/{}", discipline, competency))
            })
        })
}

pub fn list(store: &Store, discipline: &str) -> Result<Vec<CompetencyDefinition>, LedgerError> {
    store.broker().with_conn("ledger", "definitions.list", |conn| {
        let sql = format!(
            "SELECT {} FROM competency_definitions WHERE discipline = ?1 ORDER BY competency",
            DEFINITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![discipline], definition_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn delete_definition(store: &Store, id: &str, actor: &str) -> Result<(), LedgerError> {
    store.broker().with_tx(actor, "definitions.delete", |conn| {
        let n = conn.execute(
            "DELETE FROM competency_definitions WHERE id = ?1",
            params![id],
        )?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!("definition {}", id)));
        }
        Ok(())
    })
}

pub(crate) fn delete_for_discipline(
    conn: &Connection,
    discipline: &str,
) -> Result<usize, LedgerError> {
    Ok(conn.execute(
        "DELETE FROM competency_definitions WHERE discipline = ?1",
        params![discipline],
    )?)
}
