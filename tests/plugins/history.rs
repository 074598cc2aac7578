use rubric_ledger::core::error::LedgerError;
use rubric_ledger::core::store::Store;
use rubric_ledger::core::time::Stamp;
use rubric_ledger::plugins::history::{
    self, EditableField, EntityKind, HistoryQuery, apply_field_change, query_history, revert,
};
use rubric_ledger::plugins::ladder::{self, LadderField, NewLadderEntry};
use rubric_ledger::plugins::rubric::{self, NewRubricEntry, RubricField};
use std::thread;
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

fn rubric_entry(store: &Store, stage: &str, competency: &str, score_1: &str) -> String {
    rubric::create_entry(
        store,
        &NewRubricEntry {
            discipline: "Design".into(),
            level: "Senior Designer".into(),
            stage: stage.into(),
            competency: competency.into(),
            scores: [score_1.into(), "".into(), "".into(), "".into()],
        },
        &Stamp::new("seed", "100Z"),
    )
    .unwrap()
    .id
}

fn score_1(store: &Store, id: &str) -> String {
    rubric::get_entry(store, id).unwrap().unwrap().score_1
}

#[test]
fn edit_then_revert_appends_two_records() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");

    let r1 = apply_field_change(
        &store,
        EntityKind::Rubric,
        &id,
        "score_1",
        "B",
        &Stamp::new("alice", "200Z"),
    )
    .unwrap();
    assert_eq!((r1.old_value.as_str(), r1.new_value.as_str()), ("A", "B"));
    assert_eq!(r1.actor, "alice");
    assert_eq!(score_1(&store, &id), "B");

    let r2 = revert(&store, &r1.id, &Stamp::new("bob", "300Z")).unwrap();
    assert_eq!(score_1(&store, &id), "A");
    assert_ne!(r2.id, r1.id);
    assert_eq!((r2.old_value.as_str(), r2.new_value.as_str()), ("B", "A"));
    assert_eq!(r2.actor, "bob (revert)");

    let stored_r1 = history::get_record(&store, &r1.id).unwrap().unwrap();
    assert_eq!(stored_r1, r1);

    let all = query_history(&store, &HistoryQuery::for_entry(&id, 10)).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, r2.id);
    assert_eq!(all[1].id, r1.id);
}

#[test]
fn revert_overwrites_the_current_value_not_the_recorded_one() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let r1 = apply_field_change(&store, EntityKind::Rubric, &id, "score_1", "B", &Stamp::new("alice", "200Z")).unwrap();
    apply_field_change(&store, EntityKind::Rubric, &id, "score_1", "C", &Stamp::new("carol", "250Z")).unwrap();

    let r3 = revert(&store, &r1.id, &Stamp::new("bob", "300Z")).unwrap();
    assert_eq!(r3.old_value, "C");
    assert_eq!(r3.new_value, "A");
    assert_eq!(score_1(&store, &id), "A");
}

#[test]
fn reverting_a_revert_restores_the_edit() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let r1 = apply_field_change(&store, EntityKind::Rubric, &id, "score_1", "B", &Stamp::new("alice", "200Z")).unwrap();
    let r2 = revert(&store, &r1.id, &Stamp::new("bob", "300Z")).unwrap();
    let r3 = revert(&store, &r2.id, &Stamp::new("alice", "400Z")).unwrap();

    assert_eq!(score_1(&store, &id), "B");
    assert_eq!((r3.old_value.as_str(), r3.new_value.as_str()), ("A", "B"));
    assert_eq!(r3.actor, "alice (revert)");
}

#[test]
fn same_value_edit_still_records() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let r = apply_field_change(&store, EntityKind::Rubric, &id, "score_1", "A", &Stamp::new("alice", "200Z")).unwrap();
    assert_eq!(r.old_value, r.new_value);
    assert_eq!(query_history(&store, &HistoryQuery::latest(10)).unwrap().len(), 1);
}

#[test]
fn disallowed_field_is_rejected_without_writing() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");

    for field in ["discipline", "level", "id", "score_1; DROP TABLE rubric_entries", "description"] {
        let err = apply_field_change(&store, EntityKind::Rubric, &id, field, "x", &Stamp::new("eve", "200Z"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidField { .. }), "{field}: {err}");
        assert!(err.is_validation());
    }
    let err = apply_field_change(&store, EntityKind::Ladder, &id, "score_1", "x", &Stamp::new("eve", "200Z"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidField { .. }));

    assert!(query_history(&store, &HistoryQuery::latest(10)).unwrap().is_empty());
    assert_eq!(score_1(&store, &id), "A");
}

#[test]
fn unknown_entry_and_record_are_not_found() {
    let (_tmp, store) = open_store();
    let err = apply_field_change(&store, EntityKind::Rubric, "missing", "score_1", "x", &Stamp::new("a", "1Z"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let err = revert(&store, "missing", &Stamp::new("a", "1Z")).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert!(history::get_record(&store, "missing").unwrap().is_none());
}

#[test]
fn key_collision_is_a_conflict_and_changes_nothing() {
    let (_tmp, store) = open_store();
    rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let other = rubric_entry(&store, "Onsite", "Craft", "B");

    let err = apply_field_change(
        &store,
        EntityKind::Rubric,
        &other,
        "stage",
        "Portfolio Review",
        &Stamp::new("alice", "200Z"),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::ConflictError(_)), "{err}");
    assert_eq!(rubric::get_entry(&store, &other).unwrap().unwrap().stage, "Onsite");
    assert!(query_history(&store, &HistoryQuery::latest(10)).unwrap().is_empty());
}

#[test]
fn deleted_entry_leaves_an_orphaned_history() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let r1 = apply_field_change(&store, EntityKind::Rubric, &id, "score_1", "B", &Stamp::new("alice", "200Z")).unwrap();
    rubric::delete_entry(&store, &id, "alice").unwrap();

    assert!(query_history(&store, &HistoryQuery::for_discipline("Design", 10)).unwrap().is_empty());
    assert_eq!(query_history(&store, &HistoryQuery::for_entry(&id, 10)).unwrap().len(), 1);
    assert_eq!(query_history(&store, &HistoryQuery::latest(10)).unwrap().len(), 1);
    assert!(history::get_record(&store, &r1.id).unwrap().is_some());

    let err = revert(&store, &r1.id, &Stamp::new("bob", "300Z")).unwrap_err();
    assert!(matches!(err, LedgerError::RevertError(_)), "{err}");
    assert_eq!(query_history(&store, &HistoryQuery::latest(10)).unwrap().len(), 1);
}

#[test]
fn discipline_scope_covers_both_entry_kinds() {
    let (_tmp, store) = open_store();
    let rubric_id = rubric_entry(&store, "Portfolio Review", "Craft", "A");
    let ladder_id = ladder::save_entry(
        &store,
        &NewLadderEntry {
            discipline: "Design".into(),
            level: "Designer".into(),
            facet: "Craft".into(),
            description: "Solid basics".into(),
        },
        &Stamp::new("seed", "100Z"),
    )
    .unwrap()
    .id;
    let engineering = rubric::create_entry(
        &store,
        &NewRubricEntry {
            discipline: "Engineering".into(),
            level: "E3".into(),
            stage: "Coding".into(),
            competency: "Testing".into(),
            scores: Default::default(),
        },
        &Stamp::new("seed", "100Z"),
    )
    .unwrap()
    .id;

    history::apply_change(&store, &rubric_id, EditableField::Rubric(RubricField::Score2), "x", &Stamp::new("a", "200Z")).unwrap();
    history::apply_change(&store, &ladder_id, LadderField::Description.into(), "Strong basics", &Stamp::new("a", "300Z")).unwrap();
    history::apply_change(&store, &engineering, RubricField::Score1.into(), "y", &Stamp::new("a", "400Z")).unwrap();

    let design = query_history(&store, &HistoryQuery::for_discipline("Design", 10)).unwrap();
    assert_eq!(design.len(), 2);
    assert_eq!(design[0].entity, EntityKind::Ladder);
    assert_eq!(design[0].old_value, "Solid basics");
    assert_eq!(design[1].entity, EntityKind::Rubric);

    let latest = query_history(&store, &HistoryQuery::latest(1)).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].entry_id, engineering);
}

#[test]
fn concurrent_writers_form_a_gap_free_chain() {
    let (_tmp, store) = open_store();
    let id = rubric_entry(&store, "Portfolio Review", "Craft", "v0");

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    let value = format!("t{}-{}", t, i);
                    apply_field_change(
                        &store,
                        EntityKind::Rubric,
                        &id,
                        "score_1",
                        &value,
                        &Stamp::new(format!("writer-{}", t), "500Z"),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut chain = query_history(&store, &HistoryQuery::for_entry(&id, 100)).unwrap();
    chain.reverse();
    assert_eq!(chain.len(), 20);
    assert_eq!(chain[0].old_value, "v0");
    for pair in chain.windows(2) {
        assert_eq!(pair[1].old_value, pair[0].new_value);
    }
    assert_eq!(score_1(&store, &id), chain[19].new_value);
}
