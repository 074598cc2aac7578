//! rubric-ledger: a versioned store for hiring rubrics and career ladders.
//!
//! Rubric entries score one competency at one interview stage for one level
//! of a discipline. Ladder entries describe one facet at one level. Both are
//! edited one field at a time through [`plugins::history`], which records
//! every change in an append-only log that also drives reverts.
//!
//! # Architecture
//!
//! - **Store**: a directory holding `ledger.toml` and one SQLite database.
//!   Every operation takes its own connection from [`core::broker::DbBroker`];
//!   writes run in `IMMEDIATE` transactions.
//! - **Ingestion**: [`plugins::ingest`] turns spreadsheet rows into entities
//!   (pure, parallel per file); [`plugins::import`] reads a disciplines
//!   directory and upserts per discipline.
//! - **Mappings**: [`plugins::mapping`] links hiring competencies to ladder
//!   facets.
//!
//! # Examples
//!
//! ```bash
//! rubric-ledger --root .ledger import --dir disciplines --actor alice
//! rubric-ledger rubric list Design --level "Senior Designer"
//! rubric-ledger rubric edit 01J... score_1 "Ships polished work" --actor alice
//! rubric-ledger history list --discipline Design
//! rubric-ledger history revert 01J... --actor bob
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: store, broker, schema, errors, config, logging, output
//! - [`plugins`]: record kinds, history, ingestion, import, mappings

pub mod core;
pub mod plugins;

mod cli;
mod subsystems;

use crate::cli::{
    Cli, Command, DefinitionsCli, DefinitionsCommand, HistoryCli, HistoryCommand, LadderCli,
    LadderCommand, MappingCli, MappingCommand, QuestionsCli, QuestionsCommand, RubricCli,
    RubricCommand,
};
use crate::core::error::LedgerError;
use crate::core::output::{self, OutputFormat};
use crate::core::store::Store;
use crate::core::{config, logging};
use crate::plugins::history::{self, EntityKind, HistoryQuery};
use crate::plugins::ladder::{self, NewLadderEntry};
use crate::plugins::rubric::{self, NewRubricEntry};
use crate::plugins::{definitions, import, mapping, questions};

use clap::Parser;
use colored::Colorize;

const DESCRIPTION_PREVIEW: usize = 72;

pub fn run() -> Result<(), LedgerError> {
    let cli = Cli::parse();

    // Config is read before the store is opened so logging covers the open.
    let cfg = config::load_config(&cli.root)?;
    logging::init_subscriber(&cfg.log_level);
    let store = Store::open_with_config(&cli.root, cfg)?;
    let format = cli.format;

    match cli.command {
        Command::Init => output::emit(format, &store.db_path(), |path| {
            println!("{} {}", "initialized".green().bold(), path.display());
        }),
        Command::Import { dir, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            let summary = import::import_dir(&store, &dir, &stamp)?;
            output::emit(format, &summary, print_import_summary)
        }
        Command::Rubric(cli) => run_rubric_cli(&store, cli, format),
        Command::Ladder(cli) => run_ladder_cli(&store, cli, format),
        Command::History(cli) => run_history_cli(&store, cli, format),
        Command::Mapping(cli) => run_mapping_cli(&store, cli, format),
        Command::Definitions(cli) => run_definitions_cli(&store, cli, format),
        Command::Questions(cli) => run_questions_cli(&store, cli, format),
    }
}

fn print_import_summary(summary: &import::ImportSummary) {
    for report in &summary.reports {
        let status = match &report.error {
            Some(err) => format!("{} {}", "failed".red().bold(), err),
            None if report.low_confidence => format!(
                "{} accepted={} skipped={}",
                "low-confidence".yellow().bold(),
                report.accepted,
                report.skipped
            ),
            None => format!(
                "{} accepted={} skipped={}",
                "ok".green(),
                report.accepted,
                report.skipped
            ),
        };
        println!("  {} [{}] {}", report.name, report.kind, status);
    }
    for (discipline, c) in &summary.disciplines {
        println!(
            "{} rubric +{}/~{} ladder +{}/~{} definitions +{}/~{} questions +{}",
            discipline.bold(),
            c.rubric.inserted,
            c.rubric.updated,
            c.ladder.inserted,
            c.ladder.updated,
            c.definitions.inserted,
            c.definitions.updated,
            c.questions.inserted
        );
    }
    if !summary.errors.is_empty() {
        println!(
            "{} {}",
            "errors:".red().bold(),
            output::preview_messages(&summary.errors, 5, 120)
        );
    }
}

fn print_names(names: &[String]) {
    for n in names {
        println!("{}", n);
    }
}

fn print_rubric_entries(entries: &[rubric::RubricEntry]) {
    for e in entries {
        println!(
            "{} {} / {} / {} / {}",
            e.id.dimmed(),
            e.discipline,
            e.level,
            e.stage.cyan(),
            e.competency.bold()
        );
    }
}

fn print_ladder_entries(entries: &[ladder::LadderEntry]) {
    for e in entries {
        println!(
            "{} {} / {} / {}: {}",
            e.id.dimmed(),
            e.discipline,
            e.facet.cyan(),
            e.level.bold(),
            output::compact_line(&e.description, DESCRIPTION_PREVIEW)
        );
    }
}

fn print_change(r: &history::ChangeRecord) {
    println!(
        "{} {} {} {}.{}: {} -> {} ({})",
        r.changed_at.dimmed(),
        r.id,
        r.actor.bold(),
        r.entity,
        r.field.cyan(),
        output::compact_line(&r.old_value, 40).red(),
        output::compact_line(&r.new_value, 40).green(),
        r.entry_id
    );
}

fn not_found(what: &str, id: &str) -> LedgerError {
    LedgerError::NotFound(format!("{} {}", what, id))
}

fn run_rubric_cli(store: &Store, cli: RubricCli, format: OutputFormat) -> Result<(), LedgerError> {
    match cli.command {
        RubricCommand::List {
            discipline,
            level,
            stage,
        } => {
            let entries = match (level, stage) {
                (Some(level), _) => rubric::list_by_level(store, &discipline, &level)?,
                (None, Some(stage)) => rubric::list_by_stage(store, &discipline, &stage)?,
                (None, None) => rubric::list_by_discipline(store, &discipline)?,
            };
            output::emit(format, entries.as_slice(), print_rubric_entries)
        }
        RubricCommand::Get { id } => {
            let entry = rubric::get_entry(store, &id)?.ok_or_else(|| not_found("rubric entry", &id))?;
            output::emit(format, &entry, |e| {
                println!("{} {}/{}/{}/{}", e.id, e.discipline, e.level, e.stage, e.competency);
                for (i, score) in [&e.score_1, &e.score_2, &e.score_3, &e.score_4]
                    .into_iter()
                    .enumerate()
                {
                    println!("  {} {}", format!("score_{}", i + 1).cyan(), score);
                }
            })
        }
        RubricCommand::Create {
            discipline,
            level,
            stage,
            competency,
            scores,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let mut padded: [String; 4] = Default::default();
            for (slot, s) in padded.iter_mut().zip(scores) {
                *slot = s;
            }
            let entry = rubric::create_entry(
                store,
                &NewRubricEntry {
                    discipline,
                    level,
                    stage,
                    competency,
                    scores: padded,
                },
                &stamp,
            )?;
            output::emit(format, &entry, |e| {
                println!("{} {}", "created".green().bold(), e.id);
            })
        }
        RubricCommand::Edit {
            id,
            field,
            value,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let record =
                history::apply_field_change(store, EntityKind::Rubric, &id, &field, &value, &stamp)?;
            output::emit(format, &record, print_change)
        }
        RubricCommand::Delete { id, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            rubric::delete_entry(store, &id, &stamp.actor)?;
            output::emit(format, &id, |id| println!("{} {}", "deleted".red().bold(), id))
        }
        RubricCommand::Disciplines => output::emit(format, rubric::disciplines(store)?.as_slice(), print_names),
        RubricCommand::Levels { discipline } => {
            output::emit(format, rubric::levels(store, &discipline)?.as_slice(), print_names)
        }
        RubricCommand::Stages { discipline } => {
            output::emit(format, rubric::stages(store, &discipline)?.as_slice(), print_names)
        }
        RubricCommand::Competencies { discipline, stage } => output::emit(
            format,
            rubric::competencies(store, &discipline, stage.as_deref())?.as_slice(),
            print_names,
        ),
        RubricCommand::AddStage {
            discipline,
            stage,
            competencies,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let created = rubric::add_stage(store, &discipline, &stage, &competencies, &stamp)?;
            output::emit(format, &created, |n| {
                println!("{} {} entries", "created".green().bold(), n)
            })
        }
        RubricCommand::AddLevel {
            discipline,
            level,
            copy_from,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let created =
                rubric::add_level(store, &discipline, &level, copy_from.as_deref(), &stamp)?;
            output::emit(format, &created, |n| {
                println!("{} {} entries", "created".green().bold(), n)
            })
        }
        RubricCommand::DeleteStage {
            discipline,
            stage,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let n = rubric::delete_stage(store, &discipline, &stage, &stamp.actor)?;
            output::emit(format, &n, |n| println!("{} {} entries", "deleted".red().bold(), n))
        }
        RubricCommand::DeleteLevel {
            discipline,
            level,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let n = rubric::delete_level(store, &discipline, &level, &stamp.actor)?;
            output::emit(format, &n, |n| println!("{} {} entries", "deleted".red().bold(), n))
        }
        RubricCommand::CreateDiscipline {
            discipline,
            levels,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let created = rubric::create_discipline(store, &discipline, &levels, &stamp)?;
            output::emit(format, created.as_slice(), print_rubric_entries)
        }
        RubricCommand::DeleteDiscipline { discipline, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            let gone = rubric::delete_discipline(store, &discipline, &stamp.actor)?;
            output::emit(format, &gone, |d| {
                println!(
                    "{} {} rubric entries, {} definitions, {} questions",
                    "deleted".red().bold(),
                    d.rubric_entries,
                    d.definitions,
                    d.questions
                )
            })
        }
    }
}

fn run_ladder_cli(store: &Store, cli: LadderCli, format: OutputFormat) -> Result<(), LedgerError> {
    match cli.command {
        LadderCommand::List {
            discipline,
            facet,
            level,
        } => {
            let entries = match (facet, level) {
                (Some(facet), _) => ladder::list_by_facet(store, &discipline, &facet)?,
                (None, Some(level)) => ladder::list_by_level(store, &discipline, &level)?,
                (None, None) => ladder::list_by_discipline(store, &discipline)?,
            };
            output::emit(format, entries.as_slice(), print_ladder_entries)
        }
        LadderCommand::Get { id } => {
            let entry = ladder::get_entry(store, &id)?.ok_or_else(|| not_found("ladder entry", &id))?;
            output::emit(format, &entry, |e| {
                println!("{} {}/{}/{}", e.id, e.discipline, e.level, e.facet);
                println!("{}", e.description);
            })
        }
        LadderCommand::Save {
            discipline,
            level,
            facet,
            description,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let entry = ladder::save_entry(
                store,
                &NewLadderEntry {
                    discipline,
                    level,
                    facet,
                    description,
                },
                &stamp,
            )?;
            output::emit(format, &entry, |e| println!("{} {}", "saved".green().bold(), e.id))
        }
        LadderCommand::Edit {
            id,
            field,
            value,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let record =
                history::apply_field_change(store, EntityKind::Ladder, &id, &field, &value, &stamp)?;
            output::emit(format, &record, print_change)
        }
        LadderCommand::Delete { id, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            ladder::delete_entry(store, &id, &stamp.actor)?;
            output::emit(format, &id, |id| println!("{} {}", "deleted".red().bold(), id))
        }
        LadderCommand::Disciplines => output::emit(format, ladder::disciplines(store)?.as_slice(), print_names),
        LadderCommand::Facets { discipline } => {
            output::emit(format, ladder::facets(store, &discipline)?.as_slice(), print_names)
        }
        LadderCommand::Levels { discipline } => {
            output::emit(format, ladder::levels(store, &discipline)?.as_slice(), print_names)
        }
    }
}

fn run_history_cli(store: &Store, cli: HistoryCli, format: OutputFormat) -> Result<(), LedgerError> {
    match cli.command {
        HistoryCommand::List {
            entry,
            discipline,
            limit,
        } => {
            let query = HistoryQuery {
                entry_id: entry,
                discipline,
                limit: limit.unwrap_or(store.config.history_limit),
            };
            let records = history::query_history(store, &query)?;
            output::emit(format, &records, |records| {
                records.iter().for_each(print_change)
            })
        }
        HistoryCommand::Get { id } => {
            let record = history::get_record(store, &id)?.ok_or_else(|| not_found("history record", &id))?;
            output::emit(format, &record, print_change)
        }
        HistoryCommand::Revert { id, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            let record = history::revert(store, &id, &stamp)?;
            output::emit(format, &record, print_change)
        }
    }
}

fn run_mapping_cli(store: &Store, cli: MappingCli, format: OutputFormat) -> Result<(), LedgerError> {
    let print_mappings = |mappings: &[mapping::CompetencyMapping]| {
        for m in mappings {
            let arrow = if m.relationship_type.is_linked() { "->" } else { "-/-" };
            println!(
                "{} {} {} {} [{}]",
                m.id.dimmed(),
                m.hiring_competency.bold(),
                arrow,
                m.ladder_facet.cyan(),
                m.relationship_type
            );
        }
    };
    match cli.command {
        MappingCommand::List {
            discipline,
            hiring,
            facet,
        } => {
            let mappings = match (hiring, facet) {
                (Some(h), _) => mapping::by_hiring_competency(store, &discipline, &h)?,
                (None, Some(f)) => mapping::by_ladder_facet(store, &discipline, &f)?,
                (None, None) => mapping::list_by_discipline(store, &discipline)?,
            };
            output::emit(format, mappings.as_slice(), print_mappings)
        }
        MappingCommand::Set {
            discipline,
            hiring_competency,
            ladder_facet,
            relationship_type,
            notes,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let m = mapping::upsert_mapping(
                store,
                &discipline,
                &hiring_competency,
                &ladder_facet,
                &relationship_type,
                &notes,
                &stamp,
            )?;
            output::emit(format, std::slice::from_ref(&m), print_mappings)
        }
        MappingCommand::Delete { id, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            mapping::delete_mapping(store, &id, &stamp.actor)?;
            output::emit(format, &id, |id| println!("{} {}", "deleted".red().bold(), id))
        }
        MappingCommand::Seed { discipline, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            let counts = mapping::seed_mappings(store, &discipline, &stamp)?;
            output::emit(format, &counts, |c| {
                println!(
                    "{} inserted={} updated={} unchanged={}",
                    "seeded".green().bold(),
                    c.inserted,
                    c.updated,
                    c.unchanged
                )
            })
        }
    }
}

fn run_definitions_cli(
    store: &Store,
    cli: DefinitionsCli,
    format: OutputFormat,
) -> Result<(), LedgerError> {
    let print_defs = |defs: &[definitions::CompetencyDefinition]| {
        for d in defs {
            let marker = if d.low_confidence() {
                " (low confidence)".yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{}{}: {}",
                d.competency.bold(),
                marker,
                output::compact_line(&d.definition, DESCRIPTION_PREVIEW)
            );
        }
    };
    match cli.command {
        DefinitionsCommand::List { discipline } => {
            output::emit(format, definitions::list(store, &discipline)?.as_slice(), print_defs)
        }
        DefinitionsCommand::Set {
            discipline,
            competency,
            definition,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let def =
                definitions::save_definition(store, &discipline, &competency, &definition, &stamp)?;
            output::emit(format, std::slice::from_ref(&def), print_defs)
        }
        DefinitionsCommand::Delete { id, actor } => {
            let stamp = store.stamp(actor.as_deref())?;
            definitions::delete_definition(store, &id, &stamp.actor)?;
            output::emit(format, &id, |id| println!("{} {}", "deleted".red().bold(), id))
        }
    }
}

fn run_questions_cli(
    store: &Store,
    cli: QuestionsCli,
    format: OutputFormat,
) -> Result<(), LedgerError> {
    match cli.command {
        QuestionsCommand::List {
            discipline,
            stage,
            competency,
        } => {
            let qs =
                questions::list_questions(store, &discipline, stage.as_deref(), competency.as_deref())?;
            output::emit(format, &qs, |qs| {
                for q in qs {
                    println!("{} / {}: {}", q.stage.cyan(), q.competency.bold(), q.question);
                }
            })
        }
        QuestionsCommand::Add {
            discipline,
            stage,
            competency,
            question,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let outcome = questions::add_question(
                store,
                &questions::NewQuestion {
                    discipline,
                    stage,
                    competency,
                    question,
                },
                &stamp,
            )?;
            output::emit(format, &outcome, |o| println!("{:?}", o))
        }
        QuestionsCommand::Update {
            id,
            question,
            actor,
        } => {
            let stamp = store.stamp(actor.as_deref())?;
            let updated = questions::update_question(store, &id, &question, &stamp.actor)?;
            output::emit(format, &updated, |q| {
                println!("{} {} {}", "updated".green().bold(), q.id, q.question)
            })
        }
    }
}
