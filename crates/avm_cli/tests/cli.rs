use avm_core::{
    open_db, NamePolicy, Node, NodeRepository, SnapshotRequest, SqliteNodeRepository,
    StoreService, VersionService,
};
use std::path::Path;
use std::process::{Command, Output};

const POLICY: NamePolicy = NamePolicy::CaseInsensitive;

fn avm_cli(args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_avm_cli"));
    command
        .args(args)
        .env_remove("AVM_CONFIG")
        .env_remove("AVM_LOG_DIR");
    command
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "expected zero exit (stderr={})",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// One store with a single snapshot and one orphan plain file.
fn seed(db_path: &Path) {
    let conn = open_db(db_path).unwrap();
    let store = StoreService::new(&conn, POLICY).create_store("main").unwrap();
    VersionService::new(&conn, POLICY)
        .create_snapshot(
            "main",
            store.root_node_id.unwrap(),
            &SnapshotRequest {
                tag: Some("v1".to_string()),
                creator: "admin".to_string(),
                ..SnapshotRequest::default()
            },
        )
        .unwrap();
    SqliteNodeRepository::try_new(&conn)
        .unwrap()
        .create_node(&Node::plain_file("store://gone", 4, 0))
        .unwrap();
}

#[test]
fn ping_and_version_print_core_info() {
    let ping = avm_cli(&["ping"]).output().unwrap();
    assert_eq!(stdout(&ping), "avm_core ping=pong\n");

    let version = avm_cli(&["version"]).output().unwrap();
    assert!(stdout(&version).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_exits_zero_and_lists_subcommands() {
    let output = avm_cli(&["--help"]).output().unwrap();
    let text = stdout(&output);
    for command in ["scan", "versions", "reap"] {
        assert!(text.contains(command), "help must list `{command}`");
    }
}

#[test]
fn missing_store_argument_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("avm.db");
    let db = db.to_str().unwrap();

    let output = avm_cli(&["versions", db]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("<STORE>"));
}

#[test]
fn scan_versions_and_reap_report_seeded_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("avm.db");
    seed(&db_path);
    let db = db_path.to_str().unwrap();

    let scan = stdout(&avm_cli(&["scan", db]).output().unwrap());
    assert_eq!(
        scan,
        "orphans=1\nlayered_directories=0\nlayered_files=0\ncontent_urls=1\n"
    );

    let versions = stdout(&avm_cli(&["versions", db, "MAIN"]).output().unwrap());
    let lines: Vec<&str> = versions.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1\t"));
    assert!(lines[0].ends_with("\tadmin\tv1"));
    assert_eq!(lines[1], "next_version_id=2");

    let reap = stdout(&avm_cli(&["reap", db]).output().unwrap());
    assert_eq!(reap, "released store://gone\npasses=1 nodes_reaped=1\n");

    let rescan = stdout(&avm_cli(&["scan", db]).output().unwrap());
    assert!(rescan.starts_with("orphans=0\n"));
}

#[test]
fn unknown_store_fails_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("avm.db");
    seed(&db_path);

    let output = avm_cli(&["versions", db_path.to_str().unwrap(), "missing"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr)
        .contains("failed to list versions of store `missing`"));
}

#[test]
fn config_is_read_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("avm.db");
    seed(&db_path);
    let db = db_path.to_str().unwrap();

    let config_path = dir.path().join("avm.json");
    std::fs::write(&config_path, r#"{ "case_insensitive_names": false }"#).unwrap();

    let exact = avm_cli(&["versions", db, "MAIN"])
        .env("AVM_CONFIG", &config_path)
        .output()
        .unwrap();
    assert_eq!(exact.status.code(), Some(1));

    let missing = avm_cli(&["scan", db])
        .env("AVM_CONFIG", dir.path().join("absent.json"))
        .output()
        .unwrap();
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("failed to load config"));
}
