//! Links between hiring-rubric competencies and career-ladder facets.
//!
//! Mappings are many-to-many and typed by [`RelationshipType`]. Writes are
//! upserts on (discipline, hiring_competency, ladder_facet); they never touch
//! the audit log.

use crate::core::error::{self, LedgerError};
use crate::core::schemas;
use crate::core::store::{Store, UpsertCounts, UpsertOutcome};
use crate::core::time::{self, Stamp};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(RustEmbed)]
#[folder = "assets/seeds/"]
#[include = "*.toml"]
struct SeedAssets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Same competency under both names.
    Direct,
    /// Overlapping but not identical scope.
    Partial,
    /// Assessed at hiring time only.
    HiringOnly,
    /// Assessed after hire only.
    LadderOnly,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::Direct,
        RelationshipType::Partial,
        RelationshipType::HiringOnly,
        RelationshipType::LadderOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Direct => "direct",
            RelationshipType::Partial => "partial",
            RelationshipType::HiringOnly => "hiring_only",
            RelationshipType::LadderOnly => "ladder_only",
        }
    }

    /// Whether the hiring competency has a ladder counterpart at all.
    pub fn is_linked(self) -> bool {
        matches!(self, RelationshipType::Direct | RelationshipType::Partial)
    }
}

impl FromStr for RelationshipType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                LedgerError::ValidationError(format!(
                    "invalid relationship type '{}' (expected direct|partial|hiring_only|ladder_only)",
                    s
                ))
            })
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencyMapping {
    pub id: String,
    pub discipline: String,
    pub hiring_competency: String,
    pub ladder_facet: String,
    pub relationship_type: RelationshipType,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    mapping: Vec<SeedMapping>,
}

#[derive(Debug, Deserialize)]
struct SeedMapping {
    hiring_competency: String,
    ladder_facet: String,
    relationship_type: String,
    #[serde(default)]
    notes: String,
}

const MAPPING_COLUMNS: &str = "id, discipline, hiring_competency, ladder_facet, relationship_type, notes, created_at, updated_at";

pub fn initialize_mapping_db(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute(schemas::MAPPING_DB_SCHEMA, [])?;
    conn.execute(schemas::MAPPING_DB_SCHEMA_INDEX_DISCIPLINE, [])?;
    conn.execute(schemas::MAPPING_DB_SCHEMA_INDEX_HIRING, [])?;
    conn.execute(schemas::MAPPING_DB_SCHEMA_INDEX_FACET, [])?;
    Ok(())
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<CompetencyMapping> {
    let rel: String = row.get(4)?;
    let relationship_type = rel.parse::<RelationshipType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(CompetencyMapping {
        id: row.get(0)?,
        discipline: row.get(1)?,
        hiring_competency: row.get(2)?,
        ladder_facet: row.get(3)?,
        relationship_type,
        notes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_mappings(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<CompetencyMapping>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM competency_mappings WHERE {} ORDER BY hiring_competency, ladder_facet",
        MAPPING_COLUMNS, where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, mapping_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn get_by_key_conn(
    conn: &Connection,
    discipline: &str,
    hiring_competency: &str,
    ladder_facet: &str,
) -> Result<Option<CompetencyMapping>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM competency_mappings
         WHERE discipline = ?1 AND hiring_competency = ?2 AND ladder_facet = ?3",
        MAPPING_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![discipline, hiring_competency, ladder_facet],
            mapping_from_row,
        )
        .optional()?)
}

fn upsert_conn(
    conn: &Connection,
    discipline: &str,
    hiring_competency: &str,
    ladder_facet: &str,
    relationship_type: RelationshipType,
    notes: &str,
    ts: &str,
) -> Result<UpsertOutcome, LedgerError> {
    for (name, value) in [
        ("discipline", discipline),
        ("hiring_competency", hiring_competency),
        ("ladder_facet", ladder_facet),
    ] {
        if value.trim().is_empty() {
            return Err(LedgerError::ValidationError(format!(
                "mapping requires a non-empty {}",
                name
            )));
        }
    }

    match get_by_key_conn(conn, discipline, hiring_competency, ladder_facet)? {
        None => {
            conn.execute(
                "INSERT INTO competency_mappings(id, discipline, hiring_competency, ladder_facet, relationship_type, notes, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    time::new_id(),
                    discipline,
                    hiring_competency,
                    ladder_facet,
                    relationship_type.as_str(),
                    notes,
                    ts
                ],
            )
            .map_err(|e| {
                error::conflict_on_unique(e, || {
                    format!("{}/{}/{}", discipline, hiring_competency, ladder_facet)
                })
            })?;
            Ok(UpsertOutcome::Inserted)
        }
        Some(existing)
            if existing.relationship_type == relationship_type && existing.notes == notes =>
        {
            Ok(UpsertOutcome::Unchanged)
        }
        Some(existing) => {
            conn.execute(
                "UPDATE competency_mappings SET relationship_type = ?1, notes = ?2, updated_at = ?3 WHERE id = ?4",
                params![relationship_type.as_str(), notes, ts, existing.id],
            )?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Create or overwrite the mapping for (discipline, hiring, facet).
///
/// `relationship_type` is parsed here so an unknown type is rejected before the
/// store is touched.
pub fn upsert_mapping(
    store: &Store,
    discipline: &str,
    hiring_competency: &str,
    ladder_facet: &str,
    relationship_type: &str,
    notes: &str,
    stamp: &Stamp,
) -> Result<CompetencyMapping, LedgerError> {
    let rel = relationship_type.parse::<RelationshipType>()?;
    store.broker().with_tx(&stamp.actor, "mapping.upsert", |conn| {
        upsert_conn(
            conn,
            discipline,
            hiring_competency,
            ladder_facet,
            rel,
            notes,
            &stamp.at,
        )?;
        get_by_key_conn(conn, discipline, hiring_competency, ladder_facet)?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "mapping {}/{}/{}",
                discipline, hiring_competency, ladder_facet
            ))
        })
    })
}

pub fn delete_mapping(store: &Store, id: &str, actor: &str) -> Result<(), LedgerError> {
    store.broker().with_tx(actor, "mapping.delete", |conn| {
        let n = conn.execute("DELETE FROM competency_mappings WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(LedgerError::NotFound(format!("mapping {}", id)));
        }
        Ok(())
    })
}

pub fn list_by_discipline(
    store: &Store,
    discipline: &str,
) -> Result<Vec<CompetencyMapping>, LedgerError> {
    store.broker().with_conn("ledger", "mapping.list", |conn| {
        query_mappings(conn, "discipline = ?1", &[&discipline])
    })
}

pub fn by_hiring_competency(
    store: &Store,
    discipline: &str,
    hiring_competency: &str,
) -> Result<Vec<CompetencyMapping>, LedgerError> {
    store.broker().with_conn("ledger", "mapping.by_hiring", |conn| {
        query_mappings(
            conn,
            "discipline = ?1 AND hiring_competency = ?2",
            &[&discipline, &hiring_competency],
        )
    })
}

pub fn by_ladder_facet(
    store: &Store,
    discipline: &str,
    ladder_facet: &str,
) -> Result<Vec<CompetencyMapping>, LedgerError> {
    store.broker().with_conn("ledger", "mapping.by_facet", |conn| {
        query_mappings(
            conn,
            "discipline = ?1 AND ladder_facet = ?2",
            &[&discipline, &ladder_facet],
        )
    })
}

/// Disciplines with a bundled seed file.
pub fn seeded_disciplines() -> Vec<String> {
    let mut out: Vec<String> = SeedAssets::iter()
        .filter_map(|name| name.strip_suffix(".toml").map(str::to_string))
        .collect();
    out.sort();
    out
}

fn load_seed(discipline: &str) -> Result<Vec<SeedMapping>, LedgerError> {
    let name = format!("{}.toml", discipline.to_lowercase());
    let file = SeedAssets::get(&name).ok_or_else(|| {
        LedgerError::NotFound(format!("no bundled mapping seeds for '{}'", discipline))
    })?;
    let text = std::str::from_utf8(&file.data).map_err(|e| {
        LedgerError::ValidationError(format!("seed file {} is not UTF-8: {}", name, e))
    })?;
    let parsed: SeedFile = toml::from_str(text)?;
    Ok(parsed.mapping)
}

/// Upsert the bundled mappings for `discipline` in one transaction.
///
/// Re-seeding is idempotent; mappings edited since the last seed are
/// overwritten with the bundled values.
pub fn seed_mappings(
    store: &Store,
    discipline: &str,
    stamp: &Stamp,
) -> Result<UpsertCounts, LedgerError> {
    let seeds = load_seed(discipline)?;
    let typed = seeds
        .iter()
        .map(|s| s.relationship_type.parse::<RelationshipType>().map(|r| (s, r)))
        .collect::<Result<Vec<_>, _>>()?;

    let counts = store.broker().with_tx(&stamp.actor, "mapping.seed", |conn| {
        let mut counts = UpsertCounts::default();
        for (seed, rel) in &typed {
            counts.record(upsert_conn(
                conn,
                discipline,
                &seed.hiring_competency,
                &seed.ladder_facet,
                *rel,
                &seed.notes,
                &stamp.at,
            )?);
        }
        Ok(counts)
    })?;

    tracing::info!(
        discipline,
        inserted = counts.inserted,
        updated = counts.updated,
        unchanged = counts.unchanged,
        "mapping seeds applied"
    );
    Ok(counts)
}
