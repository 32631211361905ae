/// Instruction script integration tests
///
/// Writes scripts to temporary files, loads them the way the `spindle`
/// binary does and checks the final stack.

use spindle_cli::{output, run_script, OutputFormat, Rendered, Script};
use spindle_test_utils::TestCluster;
use std::fs;
use tempfile::TempDir;

fn run_file(cluster: &TestCluster, text: &str) -> anyhow::Result<Vec<Rendered>> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("script.json");
    fs::write(&path, text).unwrap();

    let script = Script::load(&path)?;
    let entries = run_script(cluster.open_database(), &script)?;
    Ok(entries.into_iter().map(|entry| entry.item).collect())
}

fn text(s: &str) -> Rendered {
    Rendered::Bytes(s.to_string())
}

#[test]
fn test_transaction_round_trip() {
    let cluster = TestCluster::new();
    let stack = run_file(
        &cluster,
        r#"{"instructions": [
            {"op": "PUSH", "arg": {"hex": "00ff"}},
            {"op": "PUSH", "arg": "bin"},
            {"op": "SET"},
            {"op": "COMMIT"},
            {"op": "WAIT_FUTURE"},
            {"op": "NEW_TRANSACTION"},
            {"op": "PUSH", "arg": "bin"},
            {"op": "GET"}
        ]}"#,
    )
    .unwrap();

    assert_eq!(stack, vec![text("RESULT_NOT_PRESENT"), text("\\x00\\xff")]);
    assert_eq!(
        cluster.db.get(b"bin").unwrap().as_deref(),
        Some(&[0x00u8, 0xff][..])
    );
}

#[test]
fn test_conflict_is_pushed_as_error() {
    let cluster = TestCluster::new();
    cluster.db.set(b"k", b"0").unwrap();

    // The first transaction reads k, the database write then changes it
    let stack = run_file(
        &cluster,
        r#"{"instructions": [
            {"op": "PUSH", "arg": "k"},
            {"op": "GET"},
            {"op": "PUSH", "arg": "1"},
            {"op": "PUSH", "arg": "k"},
            {"op": "SET_DATABASE"},
            {"op": "PUSH", "arg": "2"},
            {"op": "PUSH", "arg": "k"},
            {"op": "SET"},
            {"op": "COMMIT"}
        ]}"#,
    )
    .unwrap();

    assert_eq!(
        stack,
        vec![text("0"), text("RESULT_NOT_PRESENT"), Rendered::Error(1020)]
    );
    assert_eq!(cluster.db.get(b"k").unwrap().as_deref(), Some(&b"1"[..]));
}

#[test]
fn test_atomic_and_range_operations() {
    let cluster = TestCluster::new();
    let stack = run_file(
        &cluster,
        r#"{"instructions": [
            {"op": "PUSH", "arg": {"hex": "01"}},
            {"op": "PUSH", "arg": "n/a"},
            {"op": "PUSH", "arg": "add"},
            {"op": "ATOMIC_OP_DATABASE"},
            {"op": "PUSH", "arg": {"hex": "01"}},
            {"op": "PUSH", "arg": "n/a"},
            {"op": "PUSH", "arg": "add"},
            {"op": "ATOMIC_OP_DATABASE"},
            {"op": "PUSH", "arg": {"hex": "07"}},
            {"op": "PUSH", "arg": "n/b"},
            {"op": "SET_DATABASE"},
            {"op": "EMPTY_STACK"},
            {"op": "PUSH", "arg": -2},
            {"op": "PUSH", "arg": 0},
            {"op": "PUSH", "arg": null},
            {"op": "PUSH", "arg": "n/"},
            {"op": "GET_RANGE_STARTS_WITH_SNAPSHOT"}
        ]}"#,
    )
    .unwrap();

    assert_eq!(
        stack,
        vec![Rendered::Range(vec![
            ("n/a".to_string(), "\\x02".to_string()),
            ("n/b".to_string(), "\\x07".to_string()),
        ])]
    );
}

#[test]
fn test_fatal_machine_errors_surface() {
    let cluster = TestCluster::new();
    let err = run_file(&cluster, r#"{"instructions": [{"op": "SUB"}]}"#).unwrap_err();
    assert!(err.to_string().contains("stack is empty"));

    let err = run_file(&cluster, "{").unwrap_err();
    assert!(err.to_string().contains("Failed to parse script"));
}

#[test]
fn test_rendered_output() {
    let cluster = TestCluster::new();
    let script = Script::parse(
        r#"{"instructions": [{"op": "PUSH", "arg": 42}, {"op": "GET_READ_VERSION"}]}"#,
    )
    .unwrap();
    let entries = run_script(cluster.open_database(), &script).unwrap();

    let json = output::render(&entries, OutputFormat::Json).unwrap();
    assert!(json.contains("\"value\": 42"));
    assert!(json.contains("GOT_READ_VERSION"));

    let table = output::render(&entries, OutputFormat::Table).unwrap();
    assert!(table.contains("GOT_READ_VERSION"));
}
