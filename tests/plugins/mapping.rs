use rubric_ledger::core::error::LedgerError;
use rubric_ledger::core::store::Store;
use rubric_ledger::core::time::Stamp;
use rubric_ledger::plugins::mapping::{self, RelationshipType};
use tempfile::{TempDir, tempdir};

fn open_store() -> (TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    (tmp, store)
}

#[test]
fn upsert_overwrites_type_and_notes() {
    let (_tmp, store) = open_store();
    let s = Stamp::new("a", "100Z");
    let first = mapping::upsert_mapping(&store, "Design", "Collaboration", "Collaboration & Communication", "direct", "", &s).unwrap();
    let second = mapping::upsert_mapping(
        &store,
        "Design",
        "Collaboration",
        "Collaboration & Communication",
        "partial",
        "merged facet",
        &Stamp::new("a", "200Z"),
    )
    .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.relationship_type, RelationshipType::Partial);
    assert_eq!(second.notes, "merged facet");
    assert_eq!(second.updated_at, "200Z");
    assert_eq!(mapping::list_by_discipline(&store, "Design").unwrap().len(), 1);
}

#[test]
fn invalid_input_is_a_validation_error() {
    let (_tmp, store) = open_store();
    let s = Stamp::new("a", "100Z");
    let err = mapping::upsert_mapping(&store, "Design", "Craft", "Craft", "sort_of", "", &s).unwrap_err();
    assert!(err.is_validation());
    let err = mapping::upsert_mapping(&store, "Design", "", "Craft", "direct", "", &s).unwrap_err();
    assert!(err.is_validation());
    assert!(mapping::list_by_discipline(&store, "Design").unwrap().is_empty());
}

#[test]
fn many_to_many_lookups() {
    let (_tmp, store) = open_store();
    let s = Stamp::new("a", "100Z");
    mapping::upsert_mapping(&store, "Design", "Collaboration", "Collaboration & Communication", "partial", "", &s).unwrap();
    mapping::upsert_mapping(&store, "Design", "Communication", "Collaboration & Communication", "partial", "", &s).unwrap();
    mapping::upsert_mapping(&store, "Design", "Communication", "Influence", "partial", "", &s).unwrap();

    assert_eq!(mapping::by_ladder_facet(&store, "Design", "Collaboration & Communication").unwrap().len(), 2);
    assert_eq!(mapping::by_hiring_competency(&store, "Design", "Communication").unwrap().len(), 2);
    assert!(mapping::by_hiring_competency(&store, "Engineering", "Communication").unwrap().is_empty());
}

#[test]
fn delete_unknown_mapping_is_not_found() {
    let (_tmp, store) = open_store();
    let m = mapping::upsert_mapping(&store, "Design", "Craft", "Craft", "direct", "", &Stamp::new("a", "1Z")).unwrap();
    mapping::delete_mapping(&store, &m.id, "a").unwrap();
    assert!(matches!(
        mapping::delete_mapping(&store, &m.id, "a"),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn design_seeds_are_idempotent() {
    let (_tmp, store) = open_store();
    let first = mapping::seed_mappings(&store, "Design", &Stamp::new("seed", "1Z")).unwrap();
    assert_eq!(first.inserted, 8);
    let second = mapping::seed_mappings(&store, "Design", &Stamp::new("seed", "2Z")).unwrap();
    assert_eq!((second.inserted, second.unchanged), (0, 8));

    let all = mapping::list_by_discipline(&store, "Design").unwrap();
    assert_eq!(all.len(), 8);
    let culture = mapping::by_ladder_facet(&store, "Design", "Culture").unwrap();
    assert_eq!(culture[0].relationship_type, RelationshipType::LadderOnly);
    assert!(!culture[0].relationship_type.is_linked());

    assert!(matches!(
        mapping::seed_mappings(&store, "Finance", &Stamp::new("seed", "3Z")),
        Err(LedgerError::NotFound(_))
    ));
}
