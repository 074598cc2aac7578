use rubric_ledger::core::error::LedgerError;
use rubric_ledger::core::store::{Store, UpsertOutcome};
use rubric_ledger::core::time::Stamp;
use rubric_ledger::plugins::definitions;
use rubric_ledger::plugins::questions::{self, NewQuestion};
use rubric_ledger::plugins::rubric::{self, NewRubricEntry};
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

fn stamp() -> Stamp {
    Stamp::new("tester", "100Z")
}

fn entry(level: &str, stage: &str, competency: &str) -> NewRubricEntry {
    NewRubricEntry {
        discipline: "Design".into(),
        level: level.into(),
        stage: stage.into(),
        competency: competency.into(),
        scores: ["1".into(), "2".into(), "3".into(), "4".into()],
    }
}

fn seed_grid(store: &Store) {
    for level in ["Designer", "Senior Designer"] {
        for (stage, competency) in [
            ("Portfolio Review", "Craft"),
            ("Portfolio Review", "Storytelling"),
            ("Onsite", "Collaboration"),
        ] {
            rubric::create_entry(store, &entry(level, stage, competency), &stamp()).unwrap();
        }
    }
}

#[test]
fn create_then_read_back() {
    let (_tmp, store) = open_store();
    let created = rubric::create_entry(&store, &entry("Designer", "Onsite", "Craft"), &stamp()).unwrap();
    assert_eq!(created.score_3, "3");
    assert_eq!(created.created_at, "100Z");
    assert_eq!(created.created_at, created.updated_at);

    let by_id = rubric::get_entry(&store, &created.id).unwrap().unwrap();
    assert_eq!(by_id, created);
    let by_key = rubric::get_entry_by_key(&store, &created.key()).unwrap().unwrap();
    assert_eq!(by_key.id, created.id);
}

#[test]
fn create_rejects_existing_key_and_empty_parts() {
    let (_tmp, store) = open_store();
    rubric::create_entry(&store, &entry("Designer", "Onsite", "Craft"), &stamp()).unwrap();
    let err = rubric::create_entry(&store, &entry("Designer", "Onsite", "Craft"), &stamp()).unwrap_err();
    assert!(matches!(err, LedgerError::ConflictError(_)), "{err}");

    let err = rubric::create_entry(&store, &entry("Designer", " ", "Craft"), &stamp()).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn upsert_reports_what_it_did() {
    let (_tmp, store) = open_store();
    let e = entry("Designer", "Onsite", "Craft");
    let outcomes = store
        .broker()
        .with_tx("tester", "test.upsert", |conn| {
            let first = rubric::upsert_entry(conn, &e, "100Z")?;
            let second = rubric::upsert_entry(conn, &e, "200Z")?;
            let mut changed = e.clone();
            changed.scores[0] = "one".into();
            let third = rubric::upsert_entry(conn, &changed, "300Z")?;
            Ok((first, second, third))
        })
        .unwrap();
    assert_eq!(
        outcomes,
        (UpsertOutcome::Inserted, UpsertOutcome::Unchanged, UpsertOutcome::Updated)
    );
    let stored = rubric::get_entry_by_key(&store, &e.key()).unwrap().unwrap();
    assert_eq!(stored.score_1, "one");
    assert_eq!(stored.created_at, "100Z");
    assert_eq!(stored.updated_at, "300Z");
}

#[test]
fn listings_and_distinct_values() {
    let (_tmp, store) = open_store();
    seed_grid(&store);

    assert_eq!(rubric::list_by_discipline(&store, "Design").unwrap().len(), 6);
    assert_eq!(rubric::list_by_level(&store, "Design", "Designer").unwrap().len(), 3);
    assert_eq!(rubric::list_by_stage(&store, "Design", "Onsite").unwrap().len(), 2);
    assert_eq!(rubric::disciplines(&store).unwrap(), vec!["Design".to_string()]);
    assert_eq!(
        rubric::levels(&store, "Design").unwrap(),
        vec!["Designer".to_string(), "Senior Designer".to_string()]
    );
    assert_eq!(rubric::stages(&store, "Design").unwrap().len(), 2);
    assert_eq!(
        rubric::competencies(&store, "Design", Some("Portfolio Review")).unwrap(),
        vec!["Craft".to_string(), "Storytelling".to_string()]
    );
    assert_eq!(rubric::competencies(&store, "Design", None).unwrap().len(), 3);
}

#[test]
fn add_stage_spans_every_level() {
    let (_tmp, store) = open_store();
    let err = rubric::add_stage(&store, "Design", "Take-home", &["Craft".into()], &stamp()).unwrap_err();
    assert!(err.is_validation());

    seed_grid(&store);
    let created = rubric::add_stage(
        &store,
        "Design",
        "Take-home",
        &["Craft".into(), "Speed".into()],
        &stamp(),
    )
    .unwrap();
    assert_eq!(created, 4);
    let again = rubric::add_stage(&store, "Design", "Take-home", &["Craft".into()], &stamp()).unwrap();
    assert_eq!(again, 0);
    assert_eq!(rubric::list_by_stage(&store, "Design", "Take-home").unwrap().len(), 4);
}

#[test]
fn add_level_copies_structure() {
    let (_tmp, store) = open_store();
    seed_grid(&store);
    rubric::create_entry(&store, &entry("Senior Designer", "Onsite", "Leadership"), &stamp()).unwrap();

    let copied = rubric::add_level(&store, "Design", "Lead Designer", Some("Designer"), &stamp()).unwrap();
    assert_eq!(copied, 3);
    let all = rubric::add_level(&store, "Design", "Principal", None, &stamp()).unwrap();
    assert_eq!(all, 4);

    let lead = rubric::list_by_level(&store, "Design", "Lead Designer").unwrap();
    assert!(lead.iter().all(|e| e.score_1.is_empty()));

    let err = rubric::add_level(&store, "Design", "Designer", None, &stamp()).unwrap_err();
    assert!(matches!(err, LedgerError::ConflictError(_)));
}

#[test]
fn deletes_report_not_found_when_nothing_matched() {
    let (_tmp, store) = open_store();
    seed_grid(&store);

    assert_eq!(rubric::delete_stage(&store, "Design", "Onsite", "tester").unwrap(), 2);
    assert!(matches!(
        rubric::delete_stage(&store, "Design", "Onsite", "tester"),
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(rubric::delete_level(&store, "Design", "Designer", "tester").unwrap(), 2);
    assert!(matches!(
        rubric::delete_entry(&store, "nope", "tester"),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn delete_discipline_takes_definitions_and_questions_along() {
    let (_tmp, store) = open_store();
    seed_grid(&store);
    definitions::save_definition(&store, "Design", "Craft", "Quality of execution", &stamp()).unwrap();
    let q = NewQuestion {
        discipline: "Design".into(),
        stage: "Onsite".into(),
        competency: "Collaboration".into(),
        question: "Tell me about a disagreement".into(),
    };
    assert_eq!(questions::add_question(&store, &q, &stamp()).unwrap(), UpsertOutcome::Inserted);
    assert_eq!(questions::add_question(&store, &q, &stamp()).unwrap(), UpsertOutcome::Unchanged);

    let gone = rubric::delete_discipline(&store, "Design", "tester").unwrap();
    assert_eq!((gone.rubric_entries, gone.definitions, gone.questions), (6, 1, 1));
    assert!(rubric::list_by_discipline(&store, "Design").unwrap().is_empty());
    assert!(definitions::list(&store, "Design").unwrap().is_empty());
    assert!(questions::list_questions(&store, "Design", None, None).unwrap().is_empty());

    assert!(matches!(
        rubric::delete_discipline(&store, "Design", "tester"),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn create_discipline_adds_placeholder_per_level() {
    let (_tmp, store) = open_store();
    let created = rubric::create_discipline(
        &store,
        "Research",
        &["Researcher".to_string(), "Senior Researcher".to_string()],
        &stamp(),
    )
    .unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|e| e.stage == "General" && e.competency == "General"));
    assert!(created.iter().all(|e| e.score_1.is_empty() && e.score_4.is_empty()));
    assert_eq!(
        rubric::levels(&store, "Research").unwrap(),
        vec!["Researcher".to_string(), "Senior Researcher".to_string()]
    );

    let defaulted = rubric::create_discipline(&store, "Writing", &[], &stamp()).unwrap();
    assert_eq!(defaulted.len(), 1);
    assert_eq!(defaulted[0].level, rubric::PLACEHOLDER_LEVEL);

    assert!(matches!(
        rubric::create_discipline(&store, "Research", &[], &stamp()),
        Err(LedgerError::ConflictError(_))
    ));
    assert_eq!(rubric::list_by_discipline(&store, "Research").unwrap().len(), 2);
    assert!(rubric::create_discipline(&store, " ", &[], &stamp()).unwrap_err().is_validation());
}
