use rubric_ledger::core::store::Store;
use rubric_ledger::core::time::Stamp;
use rubric_ledger::plugins::definitions::{self, DefinitionSource};
use rubric_ledger::plugins::history::{HistoryQuery, query_history};
use rubric_ledger::plugins::import::{self, ImportSummary};
use rubric_ledger::plugins::ingest::{Batch, FileKind, RubricFormat, SourceFile};
use rubric_ledger::plugins::rubric::NewRubricEntry;
use rubric_ledger::plugins::{ladder, questions, rubric};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

const DESIGNER_CSV: &str = "\u{feff}Assessment Stage,Competency,1,2,3,4
Portfolio Review,Craft,Weak,Okay,Good,Great
,Storytelling,a,b,c,d
,Level 2,,,,
Onsite,Collaboration,a,b,c,d
,,a,b,c,d
";

const SENIOR_CSV: &str = "Focus Area,Competency,1,2,3,4
Strategy,Vision,a,b,c,d
,Influence,a,b,c,d
";

const COMPETENCIES_CSV: &str = "Focus Area,Competency,Level 1
Craft,Craft,Knows the tools
,Vision,Sees ahead
";

const QUESTIONS_CSV: &str = "Stage,Competency,Question
Onsite,Collaboration,Tell me about a disagreement
Onsite,Collaboration,
";

fn ladders_csv() -> String {
    let mut out = String::from("Facet / Level,\"Designer:\n(IC1)\",Senior Designer,Lead Designer\n");
    for facet in ["Craft", "Strategy", "Collaboration & Communication", "Innovation", "Culture"] {
        out.push_str(&format!(
            "\"{}\nWhat it covers\",\"{} one\n\n\n\nmore\",{} two,{} three\n",
            facet, facet, facet, facet
        ));
    }
    out
}

fn write_tree(dir: &Path) {
    fs::write(dir.join("index.json"), r#"{"disciplines": ["Design", "Ghost"]}"#).unwrap();
    let design = dir.join("Design");
    fs::create_dir_all(&design).unwrap();
    fs::write(
        design.join("files.json"),
        r#"{"files": [
            {"file": "Designer.csv", "level": "Designer"},
            {"file": "Senior Designer.csv"},
            {"file": "Broken.csv", "level": "Lead"},
            {"file": "Missing.csv", "level": "Principal"}
        ]}"#,
    )
    .unwrap();
    fs::write(design.join("Designer.csv"), DESIGNER_CSV).unwrap();
    fs::write(design.join("Senior Designer.csv"), SENIOR_CSV).unwrap();
    fs::write(design.join("Broken.csv"), "Assessment Stage,Competency\n").unwrap();
    fs::write(design.join("Competencies.csv"), COMPETENCIES_CSV).unwrap();
    fs::write(design.join("Questions.csv"), QUESTIONS_CSV).unwrap();
    fs::write(design.join("Ladders.csv"), ladders_csv()).unwrap();
}

fn import_once(store: &Store, dir: &Path, at: &str) -> ImportSummary {
    import::import_dir(store, dir, &Stamp::new("importer", at)).unwrap()
}

fn setup() -> (TempDir, Store, TempDir) {
    let store_dir = tempdir().unwrap();
    let store = Store::open(store_dir.path()).unwrap();
    let data = tempdir().unwrap();
    write_tree(data.path());
    (store_dir, store, data)
}

#[test]
fn imports_every_kind_of_file() {
    let (_s, store, data) = setup();
    let summary = import_once(&store, data.path(), "100Z");

    let counts = summary.disciplines["Design"];
    assert_eq!(counts.rubric.inserted, 5);
    assert_eq!(counts.ladder.inserted, 15);
    assert_eq!(counts.definitions.inserted, 2);
    assert_eq!(counts.questions.inserted, 1);

    let levels = rubric::levels(&store, "Design").unwrap();
    assert_eq!(levels, vec!["Designer".to_string(), "Senior Designer".to_string()]);
    let storytelling = rubric::list_by_stage(&store, "Design", "Portfolio Review").unwrap();
    assert_eq!(storytelling.len(), 2);

    let craft = ladder::list_by_facet(&store, "Design", "Craft").unwrap();
    assert_eq!(craft.len(), 3);
    let designer = craft.iter().find(|e| e.level == "Designer").unwrap();
    assert_eq!(designer.description, "Craft one\n\nmore");

    let defs = definitions::list(&store, "Design").unwrap();
    assert!(defs.iter().all(|d| d.source == DefinitionSource::PositionalFallback));
    assert!(defs.iter().all(|d| d.low_confidence()));

    let qs = questions::list_questions(&store, "Design", Some("Onsite"), None).unwrap();
    assert_eq!(qs.len(), 1);

    assert!(query_history(&store, &HistoryQuery::latest(10)).unwrap().is_empty());
}

#[test]
fn reports_cover_each_file_and_failures_stay_local() {
    let (_s, store, data) = setup();
    let summary = import_once(&store, data.path(), "100Z");
    assert!(!summary.is_clean());

    let report = |name: &str| {
        summary
            .reports
            .iter()
            .find(|r| r.name == format!("Design/{}", name))
            .unwrap()
    };
    let designer = report("Designer.csv");
    assert_eq!(designer.format, Some(RubricFormat::StageBased));
    assert_eq!((designer.data_rows, designer.accepted, designer.skipped), (5, 3, 2));
    assert_eq!(report("Senior Designer.csv").format, Some(RubricFormat::FocusAreaBased));
    assert!(report("Broken.csv").error.is_some());
    assert!(report("Competencies.csv").low_confidence);
    assert_eq!(report("Ladders.csv").accepted, 15);
    assert!(summary.reports.iter().all(|r| !r.name.contains("Missing")));
    assert_eq!(summary.reports.iter().filter(|r| r.error.is_some()).count(), 1);
}

#[test]
fn reimport_is_idempotent() {
    let (_s, store, data) = setup();
    import_once(&store, data.path(), "100Z");
    let before = rubric::list_by_discipline(&store, "Design").unwrap();

    let again = import_once(&store, data.path(), "200Z");
    let counts = again.disciplines["Design"];
    assert_eq!(counts.rubric.inserted + counts.rubric.updated, 0);
    assert_eq!(counts.ladder.unchanged, 15);
    assert_eq!(counts.questions.unchanged, 1);

    let after = rubric::list_by_discipline(&store, "Design").unwrap();
    assert_eq!(before, after);
    assert_eq!(ladder::list_by_discipline(&store, "Design").unwrap().len(), 15);
}

#[test]
fn changed_source_updates_in_place() {
    let (_s, store, data) = setup();
    import_once(&store, data.path(), "100Z");
    fs::write(
        data.path().join("Design").join("Designer.csv"),
        DESIGNER_CSV.replace("Weak", "Poor"),
    )
    .unwrap();

    let again = import_once(&store, data.path(), "200Z");
    assert_eq!(again.disciplines["Design"].rubric.updated, 1);
    let craft = rubric::list_by_level(&store, "Design", "Designer")
        .unwrap()
        .into_iter()
        .find(|e| e.competency == "Craft")
        .unwrap();
    assert_eq!(craft.score_1, "Poor");
    assert_eq!(craft.updated_at, "200Z");
}

#[test]
fn in_memory_sources_merge_per_discipline() {
    let (_s, store, _data) = setup();
    let rubric_rows = |score: &str| -> Vec<Vec<String>> {
        vec![
            vec!["Assessment Stage".into(), "Competency".into()],
            vec![
                "Screen".into(),
                "Craft".into(),
                score.into(),
                "".into(),
                "".into(),
                "".into(),
            ],
        ]
    };
    let files = vec![
        SourceFile {
            name: "a".into(),
            discipline: "Engineering".into(),
            kind: FileKind::Rubric,
            level: Some("E3".into()),
            rows: rubric_rows("first"),
        },
        SourceFile {
            name: "b".into(),
            discipline: "Engineering".into(),
            kind: FileKind::Rubric,
            level: Some("E3".into()),
            rows: rubric_rows("second"),
        },
    ];
    let summary = import::import_sources(&store, &files, &Stamp::new("importer", "1Z"));
    assert!(summary.is_clean());
    assert_eq!(summary.disciplines["Engineering"].rubric.inserted, 1);
    let entries = rubric::list_by_discipline(&store, "Engineering").unwrap();
    assert_eq!(entries[0].score_1, "second");
}

fn rubric_source(discipline: &str, rows: &[(&str, &str, &str)]) -> SourceFile {
    let mut cells = vec![vec!["Assessment Stage".to_string(), "Competency".to_string()]];
    for (stage, competency, score) in rows {
        cells.push(vec![
            stage.to_string(),
            competency.to_string(),
            score.to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ]);
    }
    SourceFile {
        name: format!("{}/L1.csv", discipline),
        discipline: discipline.to_string(),
        kind: FileKind::Rubric,
        level: Some("L1".to_string()),
        rows: cells,
    }
}

#[test]
fn failed_discipline_write_leaves_previous_rows() {
    let (_s, store, data) = setup();
    import_once(&store, data.path(), "100Z");
    let before = rubric::list_by_discipline(&store, "Design").unwrap();

    let mut changed = NewRubricEntry {
        discipline: "Design".into(),
        level: "Designer".into(),
        stage: "Portfolio Review".into(),
        competency: "Craft".into(),
        scores: ["Poor".into(), "Okay".into(), "Good".into(), "Great".into()],
    };
    let mut invalid = changed.clone();
    invalid.stage = String::new();
    invalid.competency = "Storytelling".into();
    let batch = Batch {
        rubric: vec![changed.clone(), invalid],
        ..Batch::default()
    };

    let err = import::persist_discipline(&store, "Design", &batch, &Stamp::new("importer", "200Z"))
        .unwrap_err();
    assert!(err.is_validation(), "{err}");
    assert_eq!(rubric::list_by_discipline(&store, "Design").unwrap(), before);

    changed.scores[0] = "Weak".into();
    let ok = Batch {
        rubric: vec![changed],
        ..Batch::default()
    };
    let counts = import::persist_discipline(&store, "Design", &ok, &Stamp::new("importer", "300Z")).unwrap();
    assert_eq!(counts.rubric.unchanged, 1);
}

#[test]
fn one_discipline_rolls_back_while_others_commit() {
    let (_s, store, _data) = setup();
    let first = vec![
        rubric_source("Design", &[("Screen", "Craft", "a")]),
        rubric_source("Engineering", &[("Screen", "Coding", "a"), ("", "Zeta", "a")]),
    ];
    assert!(import::import_sources(&store, &first, &Stamp::new("importer", "100Z")).is_clean());
    let engineering_before = rubric::list_by_discipline(&store, "Engineering").unwrap();

    store
        .broker()
        .with_tx("tester", "trigger", |conn| {
            conn.execute(
                "CREATE TRIGGER reject_zeta BEFORE UPDATE ON rubric_entries
                 WHEN NEW.competency = 'Zeta'
                 BEGIN SELECT RAISE(ABORT, 'zeta is frozen'); END",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let second = vec![
        rubric_source("Design", &[("Screen", "Craft", "new")]),
        rubric_source("Engineering", &[("Screen", "Coding", "new"), ("", "Zeta", "new")]),
    ];
    let summary = import::import_sources(&store, &second, &Stamp::new("importer", "200Z"));

    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].starts_with("Engineering"), "{:?}", summary.errors);
    assert!(!summary.disciplines.contains_key("Engineering"));
    assert_eq!(summary.disciplines["Design"].rubric.updated, 1);

    assert_eq!(rubric::list_by_discipline(&store, "Engineering").unwrap(), engineering_before);
    assert_eq!(rubric::list_by_discipline(&store, "Design").unwrap()[0].score_1, "new");
}
