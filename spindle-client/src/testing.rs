//! In-process cluster for unit tests.

use crate::{Database, Network};
use spindle_memory::{BackoffPolicy, EngineConfig, MemoryEngine};
use std::sync::Arc;

pub(crate) struct Cluster {
    pub engine: Arc<MemoryEngine>,
    pub db: Database,
    // Declared last so databases and transactions drop while it still runs.
    _network: Network,
}

impl Cluster {
    pub fn start() -> Self {
        let config = EngineConfig::default().with_backoff(BackoffPolicy::fast());
        let engine = Arc::new(MemoryEngine::with_config(config).unwrap());
        let network = Network::start(engine.clone()).unwrap();
        let db = network.open_database(None).unwrap();
        Self {
            engine,
            db,
            _network: network,
        }
    }
}
