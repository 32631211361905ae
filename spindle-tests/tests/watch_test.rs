/// Watch integration tests
///
/// Watches are set inside a transaction, armed when it commits and fire
/// when another commit changes the watched value.

use spindle_client::{error_code, ReadTransaction};
use spindle_memory::{BackoffPolicy, EngineConfig};
use spindle_test_utils::TestCluster;
use std::thread;
use std::time::Duration;

#[test]
fn test_watch_fires_on_change() {
    let cluster = TestCluster::new();
    let (value, watch) = cluster.db.get_and_watch(b"config").unwrap();
    assert_eq!(value, None);

    let writer = cluster.open_database();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        writer.set(b"config", b"v2").unwrap();
    });

    watch.get().unwrap();
    handle.join().unwrap();
    assert_eq!(cluster.db.get(b"config").unwrap().as_deref(), Some(&b"v2"[..]));
}

#[test]
fn test_watch_ignores_unchanged_value() {
    let cluster = TestCluster::new();
    let watch = cluster.db.set_and_watch(b"k", b"same").unwrap();

    cluster.db.set(b"k", b"same").unwrap();
    cluster.db.set(b"other", b"x").unwrap();
    thread::sleep(Duration::from_millis(10));
    assert!(!watch.is_ready().unwrap());

    cluster.db.clear(b"k").unwrap();
    watch.get().unwrap();
}

#[test]
fn test_watch_from_uncommitted_transaction_is_cancelled() {
    let cluster = TestCluster::new();
    let watch = {
        let tr = cluster.db.create_transaction().unwrap();
        tr.get(b"k").get().unwrap();
        tr.watch(b"k")
    };
    assert_eq!(watch.get().unwrap_err().code(), error_code::OPERATION_CANCELLED);
}

#[test]
fn test_watch_fails_with_commit_error() {
    let cluster = TestCluster::new();
    let tr = cluster.db.create_transaction().unwrap();
    tr.get(b"k").get().unwrap();
    let watch = tr.watch(b"k");
    tr.set(b"k", b"mine").unwrap();

    cluster.open_database().set(b"k", b"theirs").unwrap();
    assert_eq!(
        tr.commit().get().unwrap_err().code(),
        error_code::NOT_COMMITTED
    );
    assert_eq!(watch.get().unwrap_err().code(), error_code::NOT_COMMITTED);
}

#[test]
fn test_too_many_watches() {
    let config = EngineConfig::new()
        .with_backoff(BackoffPolicy::fast())
        .with_max_watches(2);
    let cluster = TestCluster::with_config(config);

    let first = cluster.db.set_and_watch(b"a", b"1").unwrap();
    let _second = cluster.db.set_and_watch(b"b", b"1").unwrap();
    let third = cluster.db.set_and_watch(b"c", b"1").unwrap();
    assert_eq!(third.get().unwrap_err().code(), error_code::TOO_MANY_WATCHES);
    assert_eq!(cluster.engine.stats().live_watches, 2);

    // A fired watch frees its slot
    cluster.db.set(b"a", b"2").unwrap();
    first.get().unwrap();
    let replacement = cluster.db.set_and_watch(b"c", b"1").unwrap();
    assert!(!replacement.is_ready().unwrap());
}
