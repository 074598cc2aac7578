//! CLI struct definitions for the rubric-ledger command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use crate::core::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "rubric-ledger",
    version = env!("CARGO_PKG_VERSION"),
    about = "Versioned store for hiring rubrics and career ladders, with an append-only edit history."
)]
pub(crate) struct Cli {
    /// Store directory (holds ledger.toml and the database).
    #[clap(long, global = true, default_value = ".ledger")]
    pub root: PathBuf,
    /// Output format.
    #[clap(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create the store and its schema.
    Init,
    /// Import a disciplines directory (index.json, files.json, CSVs).
    Import {
        #[clap(long)]
        dir: PathBuf,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Hiring rubric entries.
    Rubric(RubricCli),
    /// Career ladder entries.
    Ladder(LadderCli),
    /// Edit history.
    History(HistoryCli),
    /// Hiring competency to ladder facet mappings.
    Mapping(MappingCli),
    /// Competency definitions.
    Definitions(DefinitionsCli),
    /// Interview questions.
    Questions(QuestionsCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RubricCli {
    #[clap(subcommand)]
    pub command: RubricCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RubricCommand {
    /// List entries of a discipline, optionally narrowed to a level or stage.
    List {
        discipline: String,
        #[clap(long, conflicts_with = "stage")]
        level: Option<String>,
        #[clap(long)]
        stage: Option<String>,
    },
    /// Show one entry.
    Get { id: String },
    /// Create an entry; fails if the key already exists.
    Create {
        discipline: String,
        level: String,
        stage: String,
        competency: String,
        /// Up to four score descriptions, in order.
        #[clap(long = "score", num_args = 1..=4)]
        scores: Vec<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Set one field and record the change.
    Edit {
        id: String,
        /// score_1..score_4, stage or competency.
        field: String,
        value: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Delete one entry. Its history is kept.
    Delete {
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Distinct disciplines.
    Disciplines,
    /// Distinct levels of a discipline.
    Levels { discipline: String },
    /// Distinct stages of a discipline.
    Stages { discipline: String },
    /// Distinct competencies of a discipline.
    Competencies {
        discipline: String,
        #[clap(long)]
        stage: Option<String>,
    },
    /// Add a stage with competencies to every level of a discipline.
    AddStage {
        discipline: String,
        stage: String,
        #[clap(long = "competency")]
        competencies: Vec<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Add a level, optionally copying another level's stages and competencies.
    AddLevel {
        discipline: String,
        level: String,
        #[clap(long)]
        copy_from: Option<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    DeleteStage {
        discipline: String,
        stage: String,
        #[clap(long)]
        actor: Option<String>,
    },
    DeleteLevel {
        discipline: String,
        level: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Start a discipline with placeholder entries, one per `--level`.
    CreateDiscipline {
        discipline: String,
        #[clap(long = "level")]
        levels: Vec<String>,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Delete a discipline's rubric entries, definitions and questions.
    DeleteDiscipline {
        discipline: String,
        #[clap(long)]
        actor: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct LadderCli {
    #[clap(subcommand)]
    pub command: LadderCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum LadderCommand {
    List {
        discipline: String,
        #[clap(long, conflicts_with = "level")]
        facet: Option<String>,
        #[clap(long)]
        level: Option<String>,
    },
    Get {
        id: String,
    },
    /// Create one (level, facet) cell or change its description; changes are recorded in history.
    Save {
        discipline: String,
        level: String,
        facet: String,
        description: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Set one field (description, facet or level) and record the change.
    Edit {
        id: String,
        field: String,
        value: String,
        #[clap(long)]
        actor: Option<String>,
    },
    Delete {
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
    Disciplines,
    Facets {
        discipline: String,
    },
    Levels {
        discipline: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct HistoryCli {
    #[clap(subcommand)]
    pub command: HistoryCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum HistoryCommand {
    /// Most recent changes first.
    List {
        #[clap(long)]
        entry: Option<String>,
        #[clap(long)]
        discipline: Option<String>,
        /// Defaults to `history_limit` from ledger.toml.
        #[clap(long)]
        limit: Option<usize>,
    },
    Get {
        id: String,
    },
    /// Restore the value a change replaced, recording a new change.
    Revert {
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct MappingCli {
    #[clap(subcommand)]
    pub command: MappingCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MappingCommand {
    List {
        discipline: String,
        #[clap(long, conflicts_with = "facet")]
        hiring: Option<String>,
        #[clap(long)]
        facet: Option<String>,
    },
    /// Create or overwrite a mapping.
    Set {
        discipline: String,
        hiring_competency: String,
        ladder_facet: String,
        /// direct, partial, hiring_only or ladder_only.
        #[clap(long = "type", default_value = "direct")]
        relationship_type: String,
        #[clap(long, default_value = "")]
        notes: String,
        #[clap(long)]
        actor: Option<String>,
    },
    Delete {
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Apply the bundled mappings for a discipline.
    Seed {
        #[clap(default_value = "Design")]
        discipline: String,
        #[clap(long)]
        actor: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct DefinitionsCli {
    #[clap(subcommand)]
    pub command: DefinitionsCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum DefinitionsCommand {
    List {
        discipline: String,
    },
    Set {
        discipline: String,
        competency: String,
        definition: String,
        #[clap(long)]
        actor: Option<String>,
    },
    Delete {
        id: String,
        #[clap(long)]
        actor: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct QuestionsCli {
    #[clap(subcommand)]
    pub command: QuestionsCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum QuestionsCommand {
    List {
        discipline: String,
        #[clap(long)]
        stage: Option<String>,
        #[clap(long)]
        competency: Option<String>,
    },
    Add {
        discipline: String,
        stage: String,
        competency: String,
        question: String,
        #[clap(long)]
        actor: Option<String>,
    },
    /// Replace a question's text.
    Update {
        id: String,
        question: String,
        #[clap(long)]
        actor: Option<String>,
    },
}
