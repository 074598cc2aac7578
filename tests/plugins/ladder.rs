use rubric_ledger::core::error::LedgerError;
use rubric_ledger::core::store::Store;
use rubric_ledger::core::time::Stamp;
use rubric_ledger::plugins::history::{EntityKind, HistoryQuery, apply_field_change, query_history};
use rubric_ledger::plugins::ladder::{self, NewLadderEntry};
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

fn cell(level: &str, facet: &str, description: &str) -> NewLadderEntry {
    NewLadderEntry {
        discipline: "Design".into(),
        level: level.into(),
        facet: facet.into(),
        description: description.into(),
    }
}

#[test]
fn resaving_a_cell_records_the_description_change() {
    let (_tmp, store) = open_store();
    let first = ladder::save_entry(&store, &cell("Designer", "Craft", "Learns the tools"), &Stamp::new("alice", "100Z")).unwrap();
    let second = ladder::save_entry(&store, &cell("Designer", "Craft", "Masters the tools"), &Stamp::new("mallory", "200Z")).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.description, "Masters the tools");
    assert_eq!(second.created_at, "100Z");
    assert_eq!(second.updated_at, "200Z");
    assert_eq!(ladder::list_by_discipline(&store, "Design").unwrap().len(), 1);

    let history = query_history(&store, &HistoryQuery::for_entry(&first.id, 10)).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].field, "description");
    assert_eq!(history[0].old_value, "Learns the tools");
    assert_eq!(history[0].new_value, "Masters the tools");
    assert_eq!(history[0].actor, "mallory");

    let same = ladder::save_entry(&store, &cell("Designer", "Craft", "Masters the tools"), &Stamp::new("bob", "300Z")).unwrap();
    assert_eq!(same.updated_at, "200Z");
    assert_eq!(query_history(&store, &HistoryQuery::for_entry(&first.id, 10)).unwrap().len(), 1);
}

#[test]
fn new_cells_write_no_history() {
    let (_tmp, store) = open_store();
    ladder::save_entry(&store, &cell("Designer", "Craft", "text"), &Stamp::new("a", "100Z")).unwrap();
    assert!(query_history(&store, &HistoryQuery::latest(10)).unwrap().is_empty());
}

#[test]
fn lookups_by_facet_and_level() {
    let (_tmp, store) = open_store();
    let s = Stamp::new("a", "100Z");
    for level in ["Designer", "Senior Designer"] {
        for facet in ["Craft", "Strategy", "Culture"] {
            ladder::save_entry(&store, &cell(level, facet, "text"), &s).unwrap();
        }
    }

    let craft = ladder::list_by_facet(&store, "Design", "Craft").unwrap();
    assert_eq!(craft.len(), 2);
    assert!(craft.iter().all(|e| e.facet == "Craft"));
    assert_eq!(ladder::list_by_level(&store, "Design", "Designer").unwrap().len(), 3);
    assert_eq!(
        ladder::facets(&store, "Design").unwrap(),
        vec!["Craft".to_string(), "Culture".to_string(), "Strategy".to_string()]
    );
    assert_eq!(ladder::levels(&store, "Design").unwrap().len(), 2);
    assert_eq!(ladder::disciplines(&store).unwrap(), vec!["Design".to_string()]);
}

#[test]
fn level_edit_goes_through_history() {
    let (_tmp, store) = open_store();
    let s = Stamp::new("a", "100Z");
    let entry = ladder::save_entry(&store, &cell("Designer", "Craft", "text"), &s).unwrap();
    ladder::save_entry(&store, &cell("Senior Designer", "Craft", "more"), &s).unwrap();

    let rec = apply_field_change(&store, EntityKind::Ladder, &entry.id, "level", "Designer I", &Stamp::new("a", "200Z")).unwrap();
    assert_eq!(rec.old_value, "Designer");
    assert_eq!(ladder::get_entry(&store, &entry.id).unwrap().unwrap().level, "Designer I");

    let err = apply_field_change(&store, EntityKind::Ladder, &entry.id, "level", "Senior Designer", &Stamp::new("a", "300Z"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::ConflictError(_)), "{err}");

    let err = apply_field_change(&store, EntityKind::Ladder, &entry.id, "facet", "  ", &Stamp::new("a", "300Z"))
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn delete_by_id() {
    let (_tmp, store) = open_store();
    let entry = ladder::save_entry(&store, &cell("Designer", "Craft", "text"), &Stamp::new("a", "1Z")).unwrap();
    ladder::delete_entry(&store, &entry.id, "a").unwrap();
    assert!(ladder::get_entry(&store, &entry.id).unwrap().is_none());
    assert!(matches!(
        ladder::delete_entry(&store, &entry.id, "a"),
        Err(LedgerError::NotFound(_))
    ));
}
