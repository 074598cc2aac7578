//! Loads a disciplines directory into the store.
//!
//! Layout:
//!
//! ```text
//! <dir>/index.json              {"disciplines": ["Design", ...]}   (optional)
//! <dir>/<Discipline>/files.json {"files": [{"file": "L1.csv", "level": "L1"}]}
//! <dir>/<Discipline>/Competencies.csv
//! <dir>/<Discipline>/Questions.csv
//! <dir>/<Discipline>/Ladders.csv
//! ```
//!
//! Without `index.json` every subdirectory is a discipline. Files are parsed
//! by `ingest`; each discipline is then written in its own transaction.

use crate::core::error::LedgerError;
use crate::core::store::{Store, UpsertCounts};
use crate::core::time::Stamp;
use crate::plugins::definitions;
use crate::plugins::ingest::{self, Batch, FileKind, FileReport, SourceFile};
use crate::plugins::ladder;
use crate::plugins::questions;
use crate::plugins::rubric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const INDEX_FILE: &str = "index.json";
pub const FILES_MANIFEST: &str = "files.json";
pub const DEFINITIONS_FILE: &str = "Competencies.csv";
pub const QUESTIONS_FILE: &str = "Questions.csv";
pub const LADDER_FILE: &str = "Ladders.csv";

#[derive(Debug, Deserialize)]
struct DisciplineIndex {
    #[serde(default)]
    disciplines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilesManifest {
    #[serde(default)]
    files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    file: String,
    #[serde(default)]
    level: Option<String>,
}

/// Upsert tallies for one discipline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineCounts {
    pub rubric: UpsertCounts,
    pub ladder: UpsertCounts,
    pub definitions: UpsertCounts,
    pub questions: UpsertCounts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub disciplines: BTreeMap<String, DisciplineCounts>,
    pub reports: Vec<FileReport>,
    /// Unreadable files and disciplines whose write was rolled back.
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.reports.iter().all(|r| r.error.is_none())
    }
}

/// Tokenize a CSV file into cells. Rows may differ in length; a leading
/// UTF-8 BOM is dropped.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    if let Some(first) = rows.first_mut().and_then(|r| r.first_mut())
        && let Some(stripped) = first.strip_prefix('\u{feff}')
    {
        *first = stripped.to_string();
    }
    Ok(rows)
}

/// Disciplines named by `index.json`, or every subdirectory when absent.
pub fn discover_disciplines(dir: &Path) -> Result<Vec<String>, LedgerError> {
    let index_path = dir.join(INDEX_FILE);
    if index_path.exists() {
        let index: DisciplineIndex = serde_json::from_str(&fs::read_to_string(&index_path)?)?;
        return Ok(index.disciplines);
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    Ok(out)
}

fn read_manifest(discipline_dir: &Path) -> Result<Vec<ManifestFile>, LedgerError> {
    let path = discipline_dir.join(FILES_MANIFEST);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let manifest: FilesManifest = serde_json::from_str(&fs::read_to_string(&path)?)?;
    Ok(manifest.files)
}

fn level_from_file_name(file: &str) -> String {
    file.strip_suffix(".csv").unwrap_or(file).to_string()
}

/// Gather every readable source file under `dir`. Read failures are
/// returned as messages instead of aborting the walk.
pub fn collect_sources(dir: &Path) -> Result<(Vec<SourceFile>, Vec<String>), LedgerError> {
    if !dir.is_dir() {
        return Err(LedgerError::NotFound(format!(
            "disciplines directory {}",
            dir.display()
        )));
    }

    let mut sources = Vec::new();
    let mut errors = Vec::new();
    for discipline in discover_disciplines(dir)? {
        let discipline_dir = dir.join(&discipline);
        if !discipline_dir.is_dir() {
            tracing::warn!(discipline = %discipline, "discipline directory missing; skipped");
            continue;
        }

        let mut wanted: Vec<(String, FileKind, Option<String>)> = Vec::new();
        match read_manifest(&discipline_dir) {
            Ok(files) => {
                for f in files {
                    let level = f.level.unwrap_or_else(|| level_from_file_name(&f.file));
                    wanted.push((f.file, FileKind::Rubric, Some(level)));
                }
            }
            Err(err) => errors.push(format!("{}/{}: {}", discipline, FILES_MANIFEST, err)),
        }
        for (name, kind) in [
            (DEFINITIONS_FILE, FileKind::CompetencyDefinitions),
            (QUESTIONS_FILE, FileKind::Questions),
            (LADDER_FILE, FileKind::Ladder),
        ] {
            if discipline_dir.join(name).exists() {
                wanted.push((name.to_string(), kind, None));
            }
        }

        for (name, kind, level) in wanted {
            let path = discipline_dir.join(&name);
            if !path.exists() {
                tracing::warn!(discipline = %discipline, file = %name, "listed file not found; skipped");
                continue;
            }
            match read_rows(&path) {
                Ok(rows) => sources.push(SourceFile {
                    name: format!("{}/{}", discipline, name),
                    discipline: discipline.clone(),
                    kind,
                    level,
                    rows,
                }),
                Err(err) => errors.push(format!("{}/{}: {}", discipline, name, err)),
            }
        }
    }
    Ok((sources, errors))
}

/// Write one discipline's batch in a single transaction. Existing rows are
/// updated in place; nothing is deleted and no history is written.
pub fn persist_discipline(
    store: &Store,
    discipline: &str,
    batch: &Batch,
    stamp: &Stamp,
) -> Result<DisciplineCounts, LedgerError> {
    let op = format!("import.persist[{}]", discipline);
    store.broker().with_tx(&stamp.actor, &op, |conn| {
        let mut counts = DisciplineCounts::default();
        for entry in &batch.rubric {
            counts
                .rubric
                .record(rubric::upsert_entry(conn, entry, &stamp.at)?);
        }
        for entry in &batch.ladder {
            counts
                .ladder
                .record(ladder::upsert_entry(conn, entry, &stamp.at)?);
        }
        for def in &batch.definitions {
            counts
                .definitions
                .record(definitions::upsert_definition(conn, def, &stamp.at)?);
        }
        for q in &batch.questions {
            counts
                .questions
                .record(questions::insert_question(conn, q, &stamp.at)?);
        }
        Ok(counts)
    })
}

/// Parse and persist already-loaded files.
pub fn import_sources(store: &Store, files: &[SourceFile], stamp: &Stamp) -> ImportSummary {
    let run = ingest::ingest_all(files);
    let mut summary = ImportSummary {
        reports: run.reports,
        ..ImportSummary::default()
    };

    for (discipline, batch) in &run.disciplines {
        match persist_discipline(store, discipline, batch, stamp) {
            Ok(counts) => {
                tracing::info!(
                    discipline = %discipline,
                    rubric = counts.rubric.total(),
                    ladder = counts.ladder.total(),
                    definitions = counts.definitions.total(),
                    questions = counts.questions.total(),
                    "discipline imported"
                );
                summary.disciplines.insert(discipline.clone(), counts);
            }
            Err(err) => {
                tracing::warn!(discipline = %discipline, error = %err, "discipline import rolled back");
                summary.errors.push(format!("{}: {}", discipline, err));
            }
        }
    }
    summary
}

/// Import every discipline under `dir`.
pub fn import_dir(store: &Store, dir: &Path, stamp: &Stamp) -> Result<ImportSummary, LedgerError> {
    let (files, mut errors) = collect_sources(dir)?;
    tracing::info!(dir = %dir.display(), files = files.len(), "import started");
    let mut summary = import_sources(store, &files, stamp);
    errors.append(&mut summary.errors);
    summary.errors = errors;
    Ok(summary)
}
