use avm_core::db::open_db_in_memory;
use avm_core::{
    ChildEntry, HistoryLink, LinkRepository, MergeLink, NamePolicy, RepoError,
    SqliteLinkRepository,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn rename_moves_lookup_to_the_new_name() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    links
        .create_child_entry(&ChildEntry::new(1, "doc.txt", 2))
        .unwrap();
    links.rename_child_entry(1, 2, "report.txt").unwrap();

    assert!(links.get_child_entry(1, "doc.txt").unwrap().is_none());
    let renamed = links.get_child_entry(1, "report.txt").unwrap().unwrap();
    assert_eq!(renamed.child_id, 2);
    assert_eq!(renamed.name, "report.txt");
}

#[test]
fn rename_of_missing_entry_is_not_found() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    assert!(matches!(
        links.rename_child_entry(1, 2, "x"),
        Err(RepoError::NotFound {
            entity: "child entry",
            ..
        })
    ));
}

#[test]
fn case_insensitive_policy_folds_lookup_delete_and_uniqueness() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    links
        .create_child_entry(&ChildEntry::new(1, "Foo", 2))
        .unwrap();

    let upper = links.get_child_entry(1, "Foo").unwrap().unwrap();
    let lower = links.get_child_entry(1, "foo").unwrap().unwrap();
    assert_eq!(upper, lower);
    assert_eq!(upper.name, "Foo");

    let clash = links
        .create_child_entry(&ChildEntry::new(1, "FOO", 3))
        .unwrap_err();
    assert!(clash.is_constraint_violation());
    assert_eq!(links.list_child_entries(1, None).unwrap().len(), 1);

    assert!(links.delete_child_entry(1, "fOO").unwrap());
    assert!(links.list_child_entries(1, None).unwrap().is_empty());
}

#[test]
fn case_sensitive_policy_keeps_names_distinct() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseSensitive).unwrap();

    links
        .create_child_entry(&ChildEntry::new(1, "Foo", 2))
        .unwrap();
    links
        .create_child_entry(&ChildEntry::new(1, "foo", 3))
        .unwrap();

    assert_eq!(links.get_child_entry(1, "Foo").unwrap().unwrap().child_id, 2);
    assert_eq!(links.get_child_entry(1, "foo").unwrap().unwrap().child_id, 3);
    assert!(links.get_child_entry(1, "FOO").unwrap().is_none());
}

#[test]
fn pattern_listing_follows_the_policy() {
    let conn = setup();
    let insensitive = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    for (name, child) in [("Alpha.txt", 2), ("alps.md", 3), ("beta.txt", 4), ("a*b", 5)] {
        insensitive
            .create_child_entry(&ChildEntry::new(1, name, child))
            .unwrap();
    }

    let names = |pattern: &str| -> Vec<String> {
        insensitive
            .list_child_entries(1, Some(pattern))
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    };
    assert_eq!(names("AL%"), vec!["Alpha.txt", "alps.md"]);
    assert_eq!(names("%.txt"), vec!["Alpha.txt", "beta.txt"]);
    assert_eq!(names("alp_.md"), vec!["alps.md"]);
    assert_eq!(names("a*b"), vec!["a*b"]);
}

#[test]
fn child_may_have_many_parents_but_one_entry_per_parent() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    links
        .create_child_entry(&ChildEntry::new(1, "shared", 9))
        .unwrap();
    links
        .create_child_entry(&ChildEntry::new(2, "shared", 9))
        .unwrap();
    let same_parent = links
        .create_child_entry(&ChildEntry::new(1, "alias", 9))
        .unwrap_err();
    assert!(same_parent.is_constraint_violation());

    let parents: Vec<_> = links
        .list_parent_entries(9)
        .unwrap()
        .into_iter()
        .map(|entry| entry.parent_id)
        .collect();
    assert_eq!(parents, vec![1, 2]);

    assert_eq!(
        links.get_child_entry_by_child(2, 9).unwrap().unwrap().name,
        "shared"
    );
    assert!(links.delete_child_entry_by_child(2, 9).unwrap());
    assert!(!links.delete_child_entry_by_child(2, 9).unwrap());
}

#[test]
fn delete_child_entries_clears_one_directory() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    links.create_child_entry(&ChildEntry::new(1, "a", 2)).unwrap();
    links.create_child_entry(&ChildEntry::new(1, "b", 3)).unwrap();
    links.create_child_entry(&ChildEntry::new(4, "c", 5)).unwrap();

    assert_eq!(links.delete_child_entries(1).unwrap(), 2);
    assert!(links.list_child_entries(1, None).unwrap().is_empty());
    assert_eq!(links.list_child_entries(4, None).unwrap().len(), 1);
}

#[test]
fn history_links_allow_one_ancestor_and_many_descendants() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    let trunk = HistoryLink {
        ancestor_id: 1,
        descendant_id: 2,
    };
    let branch = HistoryLink {
        ancestor_id: 1,
        descendant_id: 3,
    };
    links.create_history_link(trunk).unwrap();
    links.create_history_link(branch).unwrap();

    let second_parent = links
        .create_history_link(HistoryLink {
            ancestor_id: 7,
            descendant_id: 2,
        })
        .unwrap_err();
    assert!(second_parent.is_constraint_violation());

    assert_eq!(links.get_history_link_by_descendant(2).unwrap(), Some(trunk));
    assert_eq!(links.get_history_link(1, 3).unwrap(), Some(branch));
    assert_eq!(links.get_history_link(3, 1).unwrap(), None);
    assert_eq!(
        links.list_history_links_by_ancestor(1).unwrap(),
        vec![trunk, branch]
    );

    assert!(links.delete_history_link(trunk).unwrap());
    assert_eq!(links.get_history_link_by_descendant(2).unwrap(), None);
}

#[test]
fn merge_links_track_sources_and_single_target() {
    let conn = setup();
    let links = SqliteLinkRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();

    let first = MergeLink {
        merge_from_id: 10,
        merge_to_id: 20,
    };
    let second = MergeLink {
        merge_from_id: 10,
        merge_to_id: 21,
    };
    links.create_merge_link(first).unwrap();
    links.create_merge_link(second).unwrap();

    assert_eq!(links.list_merge_links_from(10).unwrap(), vec![first, second]);
    assert_eq!(links.get_merge_link_to(21).unwrap(), Some(second));
    assert!(links
        .create_merge_link(MergeLink {
            merge_from_id: 11,
            merge_to_id: 20,
        })
        .unwrap_err()
        .is_constraint_violation());

    assert!(links.delete_merge_link(first).unwrap());
    assert!(!links.delete_merge_link(first).unwrap());
    assert_eq!(links.get_merge_link_to(20).unwrap(), None);
}
