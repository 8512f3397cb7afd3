use avm_core::db::open_db_in_memory;
use avm_core::{
    NamePolicy, Node, NodeRepository, PropertyValue, QName, ServiceError, SnapshotRequest,
    SqliteNodeRepository, SqliteStoreRepository, SqliteVersionRootRepository, StoreRepository,
    StoreService, VersionRootRepository, VersionService,
};
use rusqlite::Connection;

const POLICY: NamePolicy = NamePolicy::CaseInsensitive;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn create_store_builds_a_root_directory() {
    let conn = setup();
    let service = StoreService::new(&conn, POLICY);
    let nodes = SqliteNodeRepository::try_new(&conn).unwrap();

    let store = service.create_store("main").unwrap();
    let root = nodes.get_node(store.root_node_id.unwrap()).unwrap().unwrap();
    assert!(root.is_root);
    assert!(root.kind.is_directory());
    assert!(nodes.orphans(10).unwrap().is_empty());
}

#[test]
fn create_store_rejects_duplicates_and_bad_names() {
    let conn = setup();
    let service = StoreService::new(&conn, POLICY);
    service.create_store("main").unwrap();

    assert!(matches!(
        service.create_store("MAIN"),
        Err(ServiceError::StoreExists(_))
    ));
    assert!(matches!(
        service.create_store("bad:name"),
        Err(ServiceError::InvalidStoreName(_))
    ));
    assert!(matches!(
        service.create_store("  "),
        Err(ServiceError::InvalidStoreName(_))
    ));
}

#[test]
fn rename_store_moves_the_name_key() {
    let conn = setup();
    let service = StoreService::new(&conn, POLICY);
    let stores = SqliteStoreRepository::try_new(&conn, POLICY).unwrap();
    service.create_store("main").unwrap();
    service.create_store("staging").unwrap();

    assert!(matches!(
        service.rename_store("main", "Staging"),
        Err(ServiceError::StoreExists(_))
    ));

    let renamed = service.rename_store("main", "Main").unwrap();
    assert_eq!(renamed.name, "Main");
    assert_eq!(renamed.version, 1);

    let renamed = service.rename_store("main", "trunk").unwrap();
    assert_eq!(renamed.version, 2);
    assert!(stores.get_store_by_name("main").unwrap().is_none());
    assert!(stores.get_store_by_name("TRUNK").unwrap().is_some());

    assert!(matches!(
        service.rename_store("absent", "x"),
        Err(ServiceError::StoreNotFound(_))
    ));
}

#[test]
fn purge_store_clears_everything_but_nodes() {
    let conn = setup();
    let service = StoreService::new(&conn, POLICY);
    let versions_service = VersionService::new(&conn, POLICY);
    let nodes = SqliteNodeRepository::try_new(&conn).unwrap();
    let stores = SqliteStoreRepository::try_new(&conn, POLICY).unwrap();
    let versions = SqliteVersionRootRepository::try_new(&conn).unwrap();

    let store = service.create_store("main").unwrap();
    let root = store.root_node_id.unwrap();
    let request = SnapshotRequest {
        creator: "admin".to_string(),
        ..SnapshotRequest::default()
    };
    let frozen = nodes
        .create_node(&Node::plain_directory(0))
        .unwrap()
        .id
        .unwrap();
    versions_service.create_snapshot("main", root, &request).unwrap();
    versions_service.create_snapshot("main", frozen, &request).unwrap();
    nodes
        .create_node(&Node::plain_directory(0).new_in_store(store.id))
        .unwrap();
    stores
        .insert_property(store.id, &QName::new("ns", "k"), &PropertyValue::Integer(1))
        .unwrap();

    let summary = service.purge_store("main").unwrap();
    assert_eq!(summary.versions, 2);
    assert_eq!(summary.new_nodes_cleared, 1);
    assert_eq!(summary.properties, 1);

    assert!(stores.get_store_by_name("main").unwrap().is_none());
    assert!(versions.list_version_roots(store.id).unwrap().is_empty());
    assert!(nodes.new_in_store(store.id).unwrap().is_empty());
    assert!(!nodes.get_node(root).unwrap().unwrap().is_root);
    assert!(!nodes.get_node(frozen).unwrap().unwrap().is_root);
    assert!(matches!(
        service.purge_store("main"),
        Err(ServiceError::StoreNotFound(_))
    ));
}

#[test]
fn property_key_query_groups_by_store_name() {
    let conn = setup();
    let service = StoreService::new(&conn, POLICY);
    let stores = SqliteStoreRepository::try_new(&conn, POLICY).unwrap();
    let main = service.create_store("main").unwrap();
    let preview = service.create_store("main--preview").unwrap();

    let dns = QName::new("http://www.alfresco.org/wcm", "dns.main");
    let dns_preview = QName::new("http://www.alfresco.org/wcm", "dns.preview");
    let unrelated = QName::new("http://www.alfresco.org/wcm", "owner");
    stores
        .insert_property(main.id, &dns, &PropertyValue::Text(String::new()))
        .unwrap();
    stores
        .insert_property(main.id, &unrelated, &PropertyValue::Text("ops".to_string()))
        .unwrap();
    stores
        .insert_property(preview.id, &dns_preview, &PropertyValue::Text(String::new()))
        .unwrap();

    let grouped = service
        .query_stores_property_keys("http://www.alfresco.org/wcm", "dns.%")
        .unwrap();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped["main"].len(), 1);
    assert_eq!(grouped["main"][0].name, dns);
    assert_eq!(grouped["main--preview"][0].name, dns_preview);
}
