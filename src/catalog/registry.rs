//! Engine registry and driver surface
//!
//! A driver adapter opens a connection by datasource name; engines are
//! shared per name through an explicit registry. The process-wide
//! default registry backs the free [`open`]/[`teardown`] functions.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::catalog::Engine;
use crate::transaction::Transaction;

/// Diagnostics verbosity recognized on open
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The corresponding `tracing` level
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Options recognized on open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Share one engine per datasource name. When false, every open
    /// creates a private engine the registry does not track.
    pub unique_per_datasource: bool,
    /// Diagnostics verbosity for the opened engine
    pub log_level: LogLevel,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            unique_per_datasource: true,
            log_level: LogLevel::default(),
        }
    }
}

/// A handle on one engine, the entry point for driver adapters
#[derive(Debug, Clone)]
pub struct Connection {
    engine: Arc<Engine>,
}

impl Connection {
    /// Begin a transaction
    pub fn begin(&self) -> Transaction {
        self.engine.begin()
    }

    /// The engine behind this connection
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

/// Registry of engines keyed by datasource name
#[derive(Debug, Default)]
pub struct Registry {
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return (or create) the engine identified by the datasource name.
    pub fn open(&self, datasource: &str, options: Options) -> Connection {
        if !options.unique_per_datasource {
            return Connection {
                engine: Arc::new(Engine::with_log_level(options.log_level)),
            };
        }
        let mut engines = self.engines.lock();
        let engine = engines
            .entry(datasource.to_string())
            .or_insert_with(|| Arc::new(Engine::with_log_level(options.log_level)))
            .clone();
        Connection { engine }
    }

    /// Tear an engine down and forget it. All of its schemas are
    /// dropped; transactions still running against it fail on their
    /// next relation resolution. Returns false when the datasource was
    /// unknown.
    pub fn teardown(&self, datasource: &str) -> bool {
        let engine = self.engines.lock().remove(datasource);
        match engine {
            Some(engine) => {
                engine.teardown();
                true
            }
            None => false,
        }
    }
}

/// The process-wide default registry
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::new)
}

/// Open a connection through the default registry
pub fn open(datasource: &str, options: Options) -> Connection {
    global().open(datasource, options)
}

/// Tear down an engine of the default registry
pub fn teardown(datasource: &str) -> bool {
    global().teardown(datasource)
}
