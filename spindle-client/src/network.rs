//! API version selection and the engine's network thread.
//!
//! A process selects its API version once, then starts the network once.
//! Both are process-wide, like the engines they front: the global functions
//! here keep that state behind one lock and refuse double initialization
//! and use before initialization.
//!
//! [`Network`] is the same lifecycle as an owned value, for programs and
//! tests that manage an engine of their own.

use crate::database::Database;
use crate::error::{engine_error, EngineError, Error, Result};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use spindle_core::error_code::{self, ErrorCode};
use spindle_core::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// The only API version this client speaks.
pub const API_VERSION: i32 = 100;

const NETWORK_THREAD: &str = "spindle-network";

struct GlobalState {
    api_version: Option<i32>,
    network: Option<Network>,
    databases: HashMap<String, Database>,
}

lazy_static! {
    static ref GLOBAL: Mutex<GlobalState> = Mutex::new(GlobalState {
        api_version: None,
        network: None,
        databases: HashMap::new(),
    });
}

/// Selects the API version for this process. Must be called exactly once,
/// before anything else.
pub fn api_version(version: i32) -> Result<()> {
    let mut global = GLOBAL.lock();
    if global.api_version.is_some() {
        return Err(Error::ApiVersionAlreadySet);
    }
    if version != API_VERSION {
        return Err(Error::ApiVersionNotSupported(version));
    }
    global.api_version = Some(version);
    Ok(())
}

/// The API version selected by [`api_version`], if any.
pub fn selected_api_version() -> Option<i32> {
    GLOBAL.lock().api_version
}

/// Starts `engine`'s network thread for this process.
///
/// Fails if no API version was selected, if `engine` does not support it,
/// or if a network was already started.
pub fn start_network(engine: Arc<dyn Engine>) -> Result<()> {
    let mut global = GLOBAL.lock();
    let version = global.api_version.ok_or(Error::ApiVersionUnset)?;
    if global.network.is_some() {
        return Err(Error::NetworkAlreadySetup);
    }
    if version > engine.max_api_version() {
        return Err(Error::ApiVersionNotSupported(version));
    }
    global.network = Some(Network::start(engine)?);
    Ok(())
}

/// Opens the database described by `cluster_file` (`None` for the
/// default). Repeated calls with the same cluster file return the same
/// database.
pub fn open(cluster_file: Option<&str>) -> Result<Database> {
    let mut global = GLOBAL.lock();
    if global.api_version.is_none() {
        return Err(Error::ApiVersionUnset);
    }
    let GlobalState {
        network, databases, ..
    } = &mut *global;
    let network = network.as_ref().ok_or(Error::NetworkNotSetup)?;

    let key = cluster_file.unwrap_or_default().to_string();
    if let Some(db) = databases.get(&key) {
        return Ok(db.clone());
    }
    let db = network.open_database(cluster_file)?;
    databases.insert(key, db.clone());
    Ok(db)
}

/// Stops the process-wide network thread and forgets every open database.
///
/// The API version stays selected and the network cannot be started
/// again with the same engine.
pub fn stop_network() -> Result<()> {
    let network = {
        let mut global = GLOBAL.lock();
        global.databases.clear();
        global.network.take().ok_or(Error::NetworkNotSetup)?
    };
    network.stop()
}

fn to_error(engine: &dyn Engine, code: ErrorCode) -> Error {
    match code {
        error_code::NETWORK_ALREADY_SETUP => Error::NetworkAlreadySetup,
        error_code::NETWORK_NOT_SETUP => Error::NetworkNotSetup,
        _ => engine_error(engine, code),
    }
}

/// A running engine network thread.
///
/// Dropping it stops the thread and waits for it to exit.
pub struct Network {
    engine: Arc<dyn Engine>,
    handle: Option<JoinHandle<()>>,
}

impl Network {
    /// Sets up `engine`'s network and runs it on a new thread.
    pub fn start(engine: Arc<dyn Engine>) -> Result<Self> {
        engine
            .setup_network()
            .map_err(|code| to_error(&*engine, code))?;

        let runner = Arc::clone(&engine);
        let handle = thread::Builder::new()
            .name(NETWORK_THREAD.to_string())
            .spawn(move || {
                if let Err(code) = runner.run_network() {
                    warn!(code, "Network thread exited with error");
                }
            })
            .map_err(|e| {
                Error::Engine(EngineError::with_description(
                    error_code::INTERNAL_ERROR,
                    format!("failed to spawn network thread: {}", e),
                ))
            })?;

        info!("Network started");
        Ok(Self {
            engine,
            handle: Some(handle),
        })
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn open_database(&self, cluster_file: Option<&str>) -> Result<Database> {
        Database::open(Arc::clone(&self.engine), cluster_file)
    }

    /// Stops the network thread and waits for it to exit.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.engine
            .stop_network()
            .map_err(|code| to_error(&*self.engine, code))?;
        if handle.join().is_err() {
            warn!("Network thread panicked");
        }
        info!("Network stopped");
        Ok(())
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Failed to stop network");
        }
    }
}
