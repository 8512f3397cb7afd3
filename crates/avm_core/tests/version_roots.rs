use avm_core::db::open_db_in_memory;
use avm_core::{
    NamePolicy, NewVersionRoot, RepoError, SqliteStoreRepository, SqliteVersionRootRepository,
    StoreId, StoreRepository, VersionLayeredEntry, VersionRootFilter, VersionRootRepository,
};
use rusqlite::Connection;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn new_root(
    store_id: StoreId,
    version_id: i64,
    root_node_id: i64,
    created_at: i64,
) -> NewVersionRoot {
    NewVersionRoot {
        store_id,
        version_id,
        root_node_id,
        created_at,
        creator: "admin".to_string(),
        tag: None,
        description: None,
    }
}

#[test]
fn max_version_id_remembers_deleted_versions() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", Some(100)).unwrap();

    assert_eq!(versions.get_max_version_id(main.id).unwrap(), None);

    let v1 = versions.create_version_root(&new_root(main.id, 1, 100, 10)).unwrap();
    assert_eq!(versions.get_max_version_id(main.id).unwrap(), Some(1));

    versions.create_version_root(&new_root(main.id, 2, 200, 20)).unwrap();
    assert_eq!(versions.get_max_version_id(main.id).unwrap(), Some(2));

    versions.delete_version_root(v1.id).unwrap();
    assert_eq!(versions.get_max_version_id(main.id).unwrap(), Some(2));
    assert_eq!(stores.allocate_version_id(main.id).unwrap(), 3);

    let v2 = versions.get_by_version(main.id, 2).unwrap().unwrap();
    versions.delete_version_root(v2.id).unwrap();
    assert!(versions.get_max_version(main.id).unwrap().is_none());
    assert_eq!(versions.get_max_version_id(main.id).unwrap(), Some(3));
    assert_eq!(stores.allocate_version_id(main.id).unwrap(), 4);
}

#[test]
fn duplicate_version_number_is_rejected() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", None).unwrap();

    versions.create_version_root(&new_root(main.id, 1, 100, 10)).unwrap();
    assert!(versions
        .create_version_root(&new_root(main.id, 1, 101, 11))
        .unwrap_err()
        .is_constraint_violation());
}

#[test]
fn lookups_by_id_version_and_root() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", None).unwrap();

    let mut request = new_root(main.id, 1, 100, 10);
    request.tag = Some("release".to_string());
    let created = versions.create_version_root(&request).unwrap();

    assert_eq!(versions.get_version_root(created.id).unwrap(), Some(created.clone()));
    assert_eq!(versions.get_by_version(main.id, 1).unwrap(), Some(created.clone()));
    assert_eq!(versions.get_by_root(100).unwrap(), Some(created.clone()));
    assert_eq!(versions.get_by_version(main.id, 2).unwrap(), None);
    assert_eq!(versions.get_max_version(main.id).unwrap(), Some(created));
}

#[test]
fn update_changes_descriptive_fields_only() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", None).unwrap();
    let created = versions.create_version_root(&new_root(main.id, 1, 100, 10)).unwrap();

    let mut edited = created.clone();
    edited.tag = Some("approved".to_string());
    edited.description = Some("launch".to_string());
    edited.creator = "editor".to_string();
    edited.version_id = 77;
    edited.root_node_id = 999;
    versions.update_version_root(&edited).unwrap();

    let loaded = versions.get_version_root(created.id).unwrap().unwrap();
    assert_eq!(loaded.tag.as_deref(), Some("approved"));
    assert_eq!(loaded.description.as_deref(), Some("launch"));
    assert_eq!(loaded.creator, "editor");
    assert_eq!(loaded.version_id, 1);
    assert_eq!(loaded.root_node_id, 100);

    edited.id = 12345;
    assert!(matches!(
        versions.update_version_root(&edited),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn range_filters_use_strict_and_inclusive_bounds() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", None).unwrap();
    let other = stores.create_store("other", None).unwrap();

    for version in 1..=5 {
        versions
            .create_version_root(&new_root(main.id, version, 100 + version, version * 10))
            .unwrap();
    }
    versions.create_version_root(&new_root(other.id, 1, 900, 10)).unwrap();

    let numbers = |filter: VersionRootFilter| -> Vec<i64> {
        versions
            .list_version_roots_in(main.id, filter)
            .unwrap()
            .into_iter()
            .map(|root| root.version_id)
            .collect()
    };

    assert_eq!(numbers(VersionRootFilter::CreatedBefore(30)), vec![1, 2]);
    assert_eq!(numbers(VersionRootFilter::CreatedAfter(30)), vec![4, 5]);
    assert_eq!(
        numbers(VersionRootFilter::CreatedBetween { from: 20, to: 40 }),
        vec![2, 3, 4]
    );
    assert_eq!(numbers(VersionRootFilter::VersionBefore(3)), vec![1, 2]);
    assert_eq!(numbers(VersionRootFilter::VersionAfter(3)), vec![4, 5]);
    assert_eq!(
        numbers(VersionRootFilter::VersionBetween { from: 2, to: 4 }),
        vec![2, 3, 4]
    );
    assert_eq!(versions.list_version_roots(main.id).unwrap().len(), 5);
    assert_eq!(versions.list_version_roots(other.id).unwrap().len(), 1);
}

#[test]
fn layered_entries_outlive_their_version_root_until_deleted() {
    let conn = setup();
    let stores = SqliteStoreRepository::try_new(&conn, NamePolicy::CaseInsensitive).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();
    let main = stores.create_store("main", None).unwrap();
    let root = versions.create_version_root(&new_root(main.id, 1, 100, 10)).unwrap();

    for (md5sum, path) in [("bbb", "/www/b.html"), ("aaa", "/www/a.html")] {
        versions
            .create_layered_entry(&VersionLayeredEntry {
                version_root_id: root.id,
                md5sum: md5sum.to_string(),
                path: path.to_string(),
            })
            .unwrap();
    }

    let entries = versions.list_layered_entries(root.id).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, "/www/a.html");
    assert_eq!(entries[0].md5sum, "aaa");

    versions.delete_version_root(root.id).unwrap();
    assert_eq!(versions.list_layered_entries(root.id).unwrap().len(), 2);
    assert_eq!(versions.delete_layered_entries(root.id).unwrap(), 2);
    assert!(versions.list_layered_entries(root.id).unwrap().is_empty());
    assert!(matches!(
        versions.delete_version_root(root.id),
        Err(RepoError::NotFound { .. })
    ));
}
