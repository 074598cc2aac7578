//! Turns raw spreadsheet rows into canonical entities.
//!
//! Everything here is pure: callers hand in [`SourceFile`]s (already split
//! into cells) and get back deduplicated entities plus a [`FileReport`] per
//! file. Persistence lives in `import`.
//!
//! Rubric rows use a positional layout regardless of the detected header:
//! col0 = stage (or focus area), col1 = competency, col2..=5 = score 1..4.
//! An empty col0 inherits the last non-empty one.

use crate::core::error::LedgerError;
use crate::plugins::definitions::{DefinitionSource, NewDefinition};
use crate::plugins::ladder::{LadderKey, NewLadderEntry};
use crate::plugins::questions::NewQuestion;
use crate::plugins::rubric::{NewRubricEntry, RubricKey};
use rayon::prelude::*;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::sync::LazyLock;

const RUBRIC_MIN_CELLS: usize = 6;
const RESERVED_STAGE_LABELS: [&str; 2] = ["assessment stage", "focus area"];
const LEVEL_ROW_PREFIX: &str = "Level ";
const LADDER_CORNER_LABEL: &str = "facet / level";
/// Column used for definitions when no header mentions "description".
const FALLBACK_DEFINITION_COLUMN: usize = 2;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Rubric,
    Ladder,
    CompetencyDefinitions,
    Questions,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Rubric => "rubric",
            FileKind::Ladder => "ladder",
            FileKind::CompetencyDefinitions => "competency_definitions",
            FileKind::Questions => "questions",
        }
    }

    fn min_header_cells(self) -> usize {
        match self {
            FileKind::Questions => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header flavour of a rubric file. Diagnostic only: every format is parsed
/// with the same positional layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricFormat {
    StageBased,
    FocusAreaBased,
    Unknown,
}

pub fn detect_format(header: &[String]) -> RubricFormat {
    let first = header
        .first()
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_default();
    if first.contains("assessment stage") {
        RubricFormat::StageBased
    } else if first.contains("focus area") {
        RubricFormat::FocusAreaBased
    } else {
        RubricFormat::Unknown
    }
}

/// One logical input file, already tokenized into cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub discipline: String,
    pub kind: FileKind,
    /// Required for rubric files; ignored otherwise.
    pub level: Option<String>,
    pub rows: Vec<Vec<String>>,
}

/// Canonical entities ready for upsert, at most one per natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub rubric: Vec<NewRubricEntry>,
    pub ladder: Vec<NewLadderEntry>,
    pub definitions: Vec<NewDefinition>,
    pub questions: Vec<NewQuestion>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rubric.len() + self.ladder.len() + self.definitions.len() + self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub name: String,
    pub discipline: String,
    pub kind: FileKind,
    /// Set for rubric files only.
    pub format: Option<RubricFormat>,
    /// Rows after the header.
    pub data_rows: usize,
    /// Entities emitted, before deduplication.
    pub accepted: usize,
    /// Data rows that produced no entity.
    pub skipped: usize,
    pub low_confidence: bool,
    pub fingerprint: String,
    pub error: Option<String>,
}

impl FileReport {
    fn new(file: &SourceFile) -> Self {
        Self {
            name: file.name.clone(),
            discipline: file.discipline.clone(),
            kind: file.kind,
            format: None,
            data_rows: file.rows.len().saturating_sub(1),
            accepted: 0,
            skipped: 0,
            low_confidence: false,
            fingerprint: fingerprint(&file.rows),
            error: None,
        }
    }
}

/// Result of [`ingest_all`]: merged entities per discipline plus one report
/// per input file, in input order.
#[derive(Debug, Clone, Default)]
pub struct IngestRun {
    pub disciplines: BTreeMap<String, Batch>,
    pub reports: Vec<FileReport>,
}

impl IngestRun {
    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| r.error.is_some())
    }
}

/// Why a data row produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ShortRow,
    NoStage,
    ReservedLabel,
    NoCompetency,
    LevelLabel,
}

/// Entities parsed from one file, in row order, not yet deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

/// SHA-256 over the cells, with unit and record separators between them.
pub fn fingerprint(rows: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        for cell in row {
            hasher.update(cell.as_bytes());
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|c| c.trim()).unwrap_or("")
}

/// Rubric cells after carry-forward resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricRow {
    pub stage: String,
    pub competency: String,
    pub scores: [String; 4],
}

/// Carry-forward over rubric data rows (header excluded).
///
/// Short rows are skipped before the stage cell is looked at, so they leave
/// the carried stage untouched.
pub fn resolve_rubric_rows(rows: &[Vec<String>]) -> Vec<Result<RubricRow, SkipReason>> {
    let (_, resolved) = rows.iter().fold(
        (String::new(), Vec::with_capacity(rows.len())),
        |(mut current, mut out), row| {
            if row.len() < RUBRIC_MIN_CELLS {
                out.push(Err(SkipReason::ShortRow));
                return (current, out);
            }
            let lead = cell(row, 0);
            if !lead.is_empty() {
                current = lead.to_string();
            }
            let competency = cell(row, 1);

            let outcome = if competency.is_empty() {
                Err(SkipReason::NoCompetency)
            } else if competency.starts_with(LEVEL_ROW_PREFIX) {
                Err(SkipReason::LevelLabel)
            } else if current.is_empty() {
                Err(SkipReason::NoStage)
            } else if RESERVED_STAGE_LABELS
                .iter()
                .any(|label| current.eq_ignore_ascii_case(label))
            {
                Err(SkipReason::ReservedLabel)
            } else {
                Ok(RubricRow {
                    stage: current.clone(),
                    competency: competency.to_string(),
                    scores: [2, 3, 4, 5].map(|i| cell(row, i).to_string()),
                })
            };
            out.push(outcome);
            (current, out)
        },
    );
    resolved
}

pub fn parse_rubric(
    rows: &[Vec<String>],
    discipline: &str,
    level: &str,
) -> Parsed<NewRubricEntry> {
    let mut items = Vec::new();
    let mut skipped = 0;
    for outcome in resolve_rubric_rows(rows.get(1..).unwrap_or_default()) {
        match outcome {
            Ok(r) => items.push(NewRubricEntry {
                discipline: discipline.to_string(),
                level: level.to_string(),
                stage: r.stage,
                competency: r.competency,
                scores: r.scores,
            }),
            Err(_) => skipped += 1,
        }
    }
    Parsed { items, skipped }
}

/// Level name from a (possibly multi-line) ladder header cell.
pub fn parse_level_name(header: &str) -> Option<String> {
    let first = header.lines().map(str::trim).find(|l| !l.is_empty())?;
    let name = first.strip_suffix(':').unwrap_or(first).trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub fn normalize_description(text: &str) -> String {
    let unix = text.replace("\r\n", "\n");
    EXCESS_NEWLINES
        .replace_all(&unix, "\n\n")
        .trim()
        .to_string()
}

/// Facets are rows, levels are columns.
pub fn parse_ladder(rows: &[Vec<String>], discipline: &str) -> Parsed<NewLadderEntry> {
    let Some((header, data)) = rows.split_first() else {
        return Parsed {
            items: Vec::new(),
            skipped: 0,
        };
    };
    let levels: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, h)| parse_level_name(h).map(|name| (i, name)))
        .collect();

    let mut items = Vec::new();
    let mut skipped = 0;
    for row in data {
        let facet = row
            .first()
            .and_then(|c| c.trim().lines().next())
            .map(str::trim)
            .unwrap_or("");
        if facet.is_empty() || facet.eq_ignore_ascii_case(LADDER_CORNER_LABEL) {
            skipped += 1;
            continue;
        }
        let before = items.len();
        for (idx, level) in &levels {
            let description = normalize_description(row.get(*idx).map(String::as_str).unwrap_or(""));
            if description.is_empty() {
                continue;
            }
            items.push(NewLadderEntry {
                discipline: discipline.to_string(),
                level: level.clone(),
                facet: facet.to_string(),
                description,
            });
        }
        if items.len() == before {
            skipped += 1;
        }
    }
    Parsed { items, skipped }
}

/// Definitions come from the first header column mentioning "description";
/// without one, column 2 is used and every definition is marked
/// [`DefinitionSource::PositionalFallback`].
pub fn parse_definitions(rows: &[Vec<String>], discipline: &str) -> Parsed<NewDefinition> {
    let Some((header, data)) = rows.split_first() else {
        return Parsed {
            items: Vec::new(),
            skipped: 0,
        };
    };
    let (column, source) = match header
        .iter()
        .position(|h| h.to_lowercase().contains("description"))
    {
        Some(idx) => (idx, DefinitionSource::DescriptionColumn),
        None => (
            FALLBACK_DEFINITION_COLUMN,
            DefinitionSource::PositionalFallback,
        ),
    };

    let mut items = Vec::new();
    let mut skipped = 0;
    for row in data {
        let competency = cell(row, 1);
        if row.len() < 2 || competency.is_empty() {
            skipped += 1;
            continue;
        }
        items.push(NewDefinition {
            discipline: discipline.to_string(),
            competency: competency.to_string(),
            definition: cell(row, column).to_string(),
            source,
        });
    }
    Parsed { items, skipped }
}

/// Columns: stage, competency, question.
pub fn parse_questions(rows: &[Vec<String>], discipline: &str) -> Parsed<NewQuestion> {
    let mut items = Vec::new();
    let mut skipped = 0;
    for row in rows.iter().skip(1) {
        let (stage, competency, question) = (cell(row, 0), cell(row, 1), cell(row, 2));
        if row.len() < 3 || stage.is_empty() || competency.is_empty() || question.is_empty() {
            skipped += 1;
            continue;
        }
        items.push(NewQuestion {
            discipline: discipline.to_string(),
            stage: stage.to_string(),
            competency: competency.to_string(),
            question: question.to_string(),
        });
    }
    Parsed { items, skipped }
}

/// Insertion-ordered map where a repeated key replaces the value in place.
struct Dedup<K, V> {
    index: FxHashMap<K, usize>,
    items: Vec<V>,
}

impl<K: Hash + Eq, V> Dedup<K, V> {
    fn new() -> Self {
        Self {
            index: FxHashMap::default(),
            items: Vec::new(),
        }
    }

    fn insert(&mut self, key: K, value: V) {
        match self.index.entry(key) {
            Entry::Occupied(slot) => self.items[*slot.get()] = value,
            Entry::Vacant(slot) => {
                slot.insert(self.items.len());
                self.items.push(value);
            }
        }
    }

    fn into_vec(self) -> Vec<V> {
        self.items
    }
}

/// Accumulates entities across files, last occurrence wins.
struct BatchBuilder {
    rubric: Dedup<RubricKey, NewRubricEntry>,
    ladder: Dedup<LadderKey, NewLadderEntry>,
    definitions: Dedup<(String, String), NewDefinition>,
    questions: Dedup<NewQuestion, NewQuestion>,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            rubric: Dedup::new(),
            ladder: Dedup::new(),
            definitions: Dedup::new(),
            questions: Dedup::new(),
        }
    }

    fn extend(&mut self, batch: Batch) {
        for e in batch.rubric {
            self.rubric.insert(e.key(), e);
        }
        for e in batch.ladder {
            self.ladder.insert(e.key(), e);
        }
        for d in batch.definitions {
            self.definitions
                .insert((d.discipline.clone(), d.competency.clone()), d);
        }
        for q in batch.questions {
            self.questions.insert(q.clone(), q);
        }
    }

    fn finish(self) -> Batch {
        Batch {
            rubric: self.rubric.into_vec(),
            ladder: self.ladder.into_vec(),
            definitions: self.definitions.into_vec(),
            questions: self.questions.into_vec(),
        }
    }
}

fn format_error(file: &SourceFile, reason: impl Into<String>) -> LedgerError {
    LedgerError::FormatError {
        file: file.name.clone(),
        reason: reason.into(),
    }
}

/// Parse one file. Structural problems yield `FormatError`; row-level
/// anomalies are skipped and counted in the report.
pub fn ingest(file: &SourceFile) -> Result<(Batch, FileReport), LedgerError> {
    if file.rows.len() < 2 {
        return Err(format_error(file, "needs a header row and at least one data row"));
    }
    let header = &file.rows[0];
    let min = file.kind.min_header_cells();
    if header.len() < min {
        return Err(format_error(
            file,
            format!(
                "header has {} cell(s), {} needs at least {}",
                header.len(),
                file.kind,
                min
            ),
        ));
    }

    let mut report = FileReport::new(file);
    let mut batch = Batch::default();
    match file.kind {
        FileKind::Rubric => {
            let level = file
                .level
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| format_error(file, "rubric file has no level"))?;
            report.format = Some(detect_format(header));
            let parsed = parse_rubric(&file.rows, &file.discipline, level);
            report.accepted = parsed.items.len();
            report.skipped = parsed.skipped;
            batch.rubric = parsed.items;
        }
        FileKind::Ladder => {
            let parsed = parse_ladder(&file.rows, &file.discipline);
            report.accepted = parsed.items.len();
            report.skipped = parsed.skipped;
            batch.ladder = parsed.items;
        }
        FileKind::CompetencyDefinitions => {
            let parsed = parse_definitions(&file.rows, &file.discipline);
            report.accepted = parsed.items.len();
            report.skipped = parsed.skipped;
            report.low_confidence = parsed
                .items
                .iter()
                .any(|d| d.source == DefinitionSource::PositionalFallback);
            batch.definitions = parsed.items;
        }
        FileKind::Questions => {
            let parsed = parse_questions(&file.rows, &file.discipline);
            report.accepted = parsed.items.len();
            report.skipped = parsed.skipped;
            batch.questions = parsed.items;
        }
    }

    let mut builder = BatchBuilder::new();
    builder.extend(batch);
    let batch = builder.finish();

    tracing::debug!(
        file = %report.name,
        discipline = %report.discipline,
        kind = %report.kind,
        accepted = report.accepted,
        skipped = report.skipped,
        "file parsed"
    );
    Ok((batch, report))
}

/// Parse every file (in parallel) and merge the results per discipline in
/// input order. A file that fails structurally is reported and contributes
/// nothing; the rest still proceed.
pub fn ingest_all(files: &[SourceFile]) -> IngestRun {
    let results: Vec<Result<(Batch, FileReport), LedgerError>> =
        files.par_iter().map(ingest).collect();

    let mut builders: BTreeMap<String, BatchBuilder> = BTreeMap::new();
    let mut reports = Vec::with_capacity(files.len());
    for (file, result) in files.iter().zip(results) {
        match result {
            Ok((batch, report)) => {
                builders
                    .entry(file.discipline.clone())
                    .or_insert_with(BatchBuilder::new)
                    .extend(batch);
                reports.push(report);
            }
            Err(err) => {
                tracing::warn!(file = %file.name, discipline = %file.discipline, error = %err, "file rejected");
                let mut report = FileReport::new(file);
                report.error = Some(err.to_string());
                reports.push(report);
            }
        }
    }

    IngestRun {
        disciplines: builders
            .into_iter()
            .map(|(d, b)| (d, b.finish()))
            .collect(),
        reports,
    }
}
