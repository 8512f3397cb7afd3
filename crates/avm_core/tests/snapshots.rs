use avm_core::db::open_db_in_memory;
use avm_core::{
    NamePolicy, Node, NodeRepository, ServiceError, SnapshotRequest, SqliteNodeRepository,
    SqliteVersionRootRepository, StoreService, VersionLayeredEntry, VersionRootRepository,
    VersionService,
};
use rusqlite::Connection;

const POLICY: NamePolicy = NamePolicy::CaseInsensitive;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn request() -> SnapshotRequest {
    SnapshotRequest {
        creator: "admin".to_string(),
        ..SnapshotRequest::default()
    }
}

fn new_directory(conn: &Connection) -> i64 {
    SqliteNodeRepository::try_new(conn)
        .unwrap()
        .create_node(&Node::plain_directory(0))
        .unwrap()
        .id
        .unwrap()
}

#[test]
fn version_numbers_are_dense_and_never_reused() {
    let conn = setup();
    let store = StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);
    let root = store.root_node_id.unwrap();

    let v1 = service.create_snapshot("main", root, &request()).unwrap();
    assert_eq!(v1.version_id, 1);
    assert_eq!(service.latest_snapshot_id("main").unwrap(), Some(1));

    let r2 = new_directory(&conn);
    let v2 = service.create_snapshot("main", r2, &request()).unwrap();
    assert_eq!(v2.version_id, 2);
    assert_eq!(service.latest_snapshot_id("main").unwrap(), Some(2));

    service.purge_version("main", 1).unwrap();
    assert_eq!(service.latest_snapshot_id("main").unwrap(), Some(2));
    assert_eq!(service.next_version_id("MAIN").unwrap(), 3);

    let r3 = new_directory(&conn);
    let v3 = service.create_snapshot("main", r3, &request()).unwrap();
    assert_eq!(v3.version_id, 3);

    service.purge_version("main", 3).unwrap();
    let r4 = new_directory(&conn);
    assert_eq!(
        service
            .create_snapshot("main", r4, &request())
            .unwrap()
            .version_id,
        4
    );
}

#[test]
fn snapshot_flags_root_and_purge_releases_it() {
    let conn = setup();
    StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);
    let nodes = SqliteNodeRepository::try_new(&conn).unwrap();
    let frozen = new_directory(&conn);

    service.create_snapshot("main", frozen, &request()).unwrap();
    assert!(nodes.get_node(frozen).unwrap().unwrap().is_root);

    service.purge_version("main", 1).unwrap();
    assert!(!nodes.get_node(frozen).unwrap().unwrap().is_root);
    assert_eq!(service.latest_snapshot_id("main").unwrap(), None);
}

#[test]
fn purge_keeps_root_flag_of_the_current_store_root() {
    let conn = setup();
    let store = StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);
    let nodes = SqliteNodeRepository::try_new(&conn).unwrap();
    let root = store.root_node_id.unwrap();

    service.create_snapshot("main", root, &request()).unwrap();
    service.purge_version("main", 1).unwrap();
    assert!(nodes.get_node(root).unwrap().unwrap().is_root);
}

#[test]
fn snapshot_can_carry_previous_layered_entries() {
    let conn = setup();
    StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();

    let v1 = service
        .create_snapshot("main", new_directory(&conn), &request())
        .unwrap();
    versions
        .create_layered_entry(&VersionLayeredEntry {
            version_root_id: v1.id,
            md5sum: "d41d8cd9".to_string(),
            path: "/www/index.html".to_string(),
        })
        .unwrap();

    let carried = SnapshotRequest {
        carry_layered_entries: true,
        tag: Some("nightly".to_string()),
        ..request()
    };
    let v2 = service
        .create_snapshot("main", new_directory(&conn), &carried)
        .unwrap();
    assert_eq!(v2.tag.as_deref(), Some("nightly"));
    let entries = versions.list_layered_entries(v2.id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "/www/index.html");

    let v3 = service
        .create_snapshot("main", new_directory(&conn), &request())
        .unwrap();
    assert!(versions.list_layered_entries(v3.id).unwrap().is_empty());
}

#[test]
fn failed_snapshot_does_not_consume_a_version_number() {
    let conn = setup();
    StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);

    assert!(matches!(
        service.create_snapshot("main", 9_999, &request()),
        Err(ServiceError::NodeNotFound(9_999))
    ));
    assert!(matches!(
        service.create_snapshot("absent", 1, &request()),
        Err(ServiceError::StoreNotFound(_))
    ));
    assert_eq!(service.next_version_id("main").unwrap(), 1);
}

#[test]
fn purge_of_unknown_version_is_reported() {
    let conn = setup();
    StoreService::new(&conn, POLICY).create_store("main").unwrap();
    let service = VersionService::new(&conn, POLICY);

    assert!(matches!(
        service.purge_version("main", 5),
        Err(ServiceError::VersionNotFound { version_id: 5, .. })
    ));
}
