//! Test utilities for Spindle integration tests
//!
//! Every test gets its own in-process engine and network thread, so tests
//! in one binary can run in parallel without sharing keys.

use spindle_client::{Database, KeyValue, Network};
use spindle_memory::{BackoffPolicy, EngineConfig, MemoryEngine};
use std::sync::Arc;

/// An engine, its running network and one open database
pub struct TestCluster {
    pub engine: Arc<MemoryEngine>,
    pub db: Database,
    // Dropped last so handles are released while the network still runs
    network: Network,
}

impl TestCluster {
    /// Start a cluster with fast retry backoff
    pub fn new() -> Self {
        Self::with_config(EngineConfig::new().with_backoff(BackoffPolicy::fast()))
    }

    /// Start a cluster with a custom engine configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let engine = Arc::new(MemoryEngine::with_config(config).expect("Invalid engine config"));
        let network = Network::start(engine.clone()).expect("Failed to start network");
        let db = network
            .open_database(None)
            .expect("Failed to open database");

        Self {
            engine,
            db,
            network,
        }
    }

    /// Open another handle to the same engine
    pub fn open_database(&self) -> Database {
        self.network
            .open_database(None)
            .expect("Failed to open database")
    }

    /// Write `count` keys `{prefix}00000`, `{prefix}00001`, ... with values
    /// `v0`, `v1`, ... in one transaction and return them in key order
    pub fn load(&self, prefix: &str, count: usize) -> Vec<KeyValue> {
        let kvs = keys(prefix, count);
        self.db
            .transact(|tr| {
                for kv in &kvs {
                    tr.set(&kv.key, &kv.value)?;
                }
                Ok::<_, spindle_client::Error>(())
            })
            .expect("Failed to load keys");
        kvs
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// The pairs [`TestCluster::load`] writes, without writing them
pub fn keys(prefix: &str, count: usize) -> Vec<KeyValue> {
    (0..count)
        .map(|i| {
            KeyValue::new(
                format!("{}{:05}", prefix, i).into_bytes(),
                format!("v{}", i).into_bytes(),
            )
        })
        .collect()
}
