//! **rt-runtime** – the top-level facade: reads [`RuntimeConfig`], picks a
//! storage backend, and wires the handler registry, projection dispatcher,
//! command executor, tick scheduler, incoming decryptor and recheck
//! subsystem into one [`Runtime`] object.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rt_engine::{
    Command, Dispatcher, Executor, IncomingDecryptor, Projector, RecheckDrainer, RecheckReport,
    Registry, Scheduler, TickReport,
};
use rt_store_core::{PersistentStore, StorageError};
use rt_store_memory::MemoryStore;
use rt_store_sqlite::SqliteStore;
use rt_types::CommandResult;
use serde::Deserialize;
use serde_json::Value;

fn default_handler_path() -> String {
    "handlers".to_string()
}

fn default_crypto_mode() -> String {
    "dummy".to_string()
}

fn default_db_path() -> String {
    ":memory:".to_string()
}

/// Runtime configuration, loaded from
/// environment variables (and an optional `.env` file) via the `config` and
/// `dotenv` crates rather than read ad hoc at each call site.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Filesystem root for handler discovery. Default `"handlers"`.
    #[serde(default = "default_handler_path")]
    pub handler_path: String,
    /// `"real"` or `"dummy"` (anything else is treated as `"dummy"`).
    /// Default `"dummy"`.
    #[serde(default = "default_crypto_mode")]
    pub crypto_mode: String,
    /// Store file path. Empty or `":memory:"` means ephemeral. Default
    /// `":memory:"`.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Enables verbose internal tracing. Default `false`.
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            handler_path: default_handler_path(),
            crypto_mode: default_crypto_mode(),
            db_path: default_db_path(),
            test_mode: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `HANDLER_PATH`, `CRYPTO_MODE`, `DB_PATH` and
    /// `TEST_MODE` environment variables, first loading a `.env` file if one
    /// is present.
    pub fn from_env() -> Result<Self, RuntimeError> {
        dotenv::dotenv().ok();
        let built = config::Config::builder()
            .set_default("handler_path", default_handler_path())
            .map_err(config_error)?
            .set_default("crypto_mode", default_crypto_mode())
            .map_err(config_error)?
            .set_default("db_path", default_db_path())
            .map_err(config_error)?
            .set_default("test_mode", false)
            .map_err(config_error)?
            .add_source(config::Environment::default())
            .build()
            .map_err(config_error)?;
        built.try_deserialize().map_err(config_error)
    }

    /// Configuration suitable for tests: ephemeral in-memory store, dummy
    /// crypto, a caller-supplied handler path.
    pub fn for_tests(handler_path: impl Into<String>) -> Self {
        Self {
            handler_path: handler_path.into(),
            ..Self::default()
        }
    }

    fn resolved_crypto_mode(&self) -> rt_crypto::CryptoMode {
        if self.crypto_mode.eq_ignore_ascii_case("real") {
            rt_crypto::CryptoMode::Real
        } else {
            rt_crypto::CryptoMode::Dummy
        }
    }

    fn is_ephemeral(&self) -> bool {
        self.db_path.is_empty() || self.db_path == ":memory:"
    }
}

fn config_error(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Configuration(e.to_string())
}

/// Errors surfaced by the runtime facade. Aggregates every component
/// error behind `#[from]` so callers see one error type.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// `RuntimeConfig` could not be loaded or was invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Handler registry discovery or loading failed.
    #[error(transparent)]
    Registry(#[from] rt_engine::RegistryError),
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Dispatching an envelope failed.
    #[error(transparent)]
    Dispatch(#[from] rt_engine::DispatchError),
    /// Running a command failed.
    #[error(transparent)]
    Exec(#[from] rt_engine::ExecError),
    /// Running the tick scheduler failed.
    #[error(transparent)]
    Scheduler(#[from] rt_engine::SchedulerError),
    /// Draining `incoming` failed.
    #[error(transparent)]
    Decrypt(#[from] rt_engine::DecryptError),
}

/// Summary of one [`Runtime::tick`] call: the decryptor drain, the
/// protocol-declared jobs, and the recheck replay, run in that order.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// Blobs pulled out of `incoming` and handed to the dispatcher.
    pub incoming_processed: usize,
    /// Protocol-declared jobs run this tick.
    pub jobs: TickReport,
    /// Recheck drain result.
    pub recheck: RecheckReport,
}

/// The assembled runtime: storage, registry, and every engine component
/// wired together.
pub struct Runtime {
    store: Arc<dyn PersistentStore>,
    registry: Arc<Registry>,
    executor: Executor,
    scheduler: Scheduler,
    decryptor: IncomingDecryptor,
    recheck: RecheckDrainer,
    drainer_identity: String,
}

impl Runtime {
    /// Build a runtime from `config`: picks the storage backend, discovers
    /// handlers under `config.handler_path`, and wires every engine
    /// component around them.
    pub async fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let store = Self::open_store(&config).await?;
        let registry = Arc::new(load_registry(&config.handler_path)?);
        Ok(Self::from_parts(store, registry, config.resolved_crypto_mode()))
    }

    /// Build a runtime over an already-open store and registry, bypassing
    /// both config parsing and filesystem discovery. Used by tests that
    /// register handlers purely at runtime.
    pub fn from_parts(
        store: Arc<dyn PersistentStore>,
        registry: Arc<Registry>,
        crypto_mode: rt_crypto::CryptoMode,
    ) -> Self {
        Self {
            executor: Executor::new(store.clone(), registry.clone()),
            scheduler: Scheduler::new(store.clone(), registry.clone()),
            decryptor: IncomingDecryptor::new(store.clone(), registry.clone(), crypto_mode),
            recheck: RecheckDrainer::new(store.clone(), registry.clone()),
            drainer_identity: format!("runtime-{}", uuid::Uuid::new_v4()),
            store,
            registry,
        }
    }

    async fn open_store(config: &RuntimeConfig) -> Result<Arc<dyn PersistentStore>, RuntimeError> {
        if config.is_ephemeral() {
            tracing::info!("opening ephemeral in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        } else {
            tracing::info!(path = %config.db_path, "opening sqlite store");
            Ok(Arc::new(SqliteStore::open(&config.db_path).await?))
        }
    }

    /// Apply a protocol-supplied schema to the store.
    pub async fn apply_schema(&self, sql: &str) -> Result<(), RuntimeError> {
        self.store.apply_schema(sql).await.map_err(Into::into)
    }

    /// Register a projector for a handler name (runtime binding, see
    /// `rt_engine::registry`).
    pub async fn register_projector(&self, handler: impl Into<String>, projector: Arc<dyn Projector>) {
        rt_engine::registry::register_projector(handler, projector).await;
    }

    /// Register a command for a `(handler, command)` pair.
    pub async fn register_command(
        &self,
        handler: impl Into<String>,
        command: impl Into<String>,
        implementation: Arc<dyn Command>,
    ) {
        rt_engine::registry::register_command(handler, command, implementation).await;
    }

    /// Run `handler.command` with `input`.
    pub async fn run_command(
        &self,
        handler: &str,
        command: &str,
        input: Value,
        time_now_ms: i64,
    ) -> Result<CommandResult, RuntimeError> {
        self.executor
            .run_command(handler, command, input, time_now_ms)
            .await
            .map_err(Into::into)
    }

    /// Append a raw blob to `incoming`, as an external transport would.
    pub async fn enqueue_incoming(&self, blob: Value) -> Result<(), RuntimeError> {
        let mut tx = self.store.begin_transaction().await?;
        let current = tx
            .get(rt_store_core::reserved_keys::INCOMING)
            .await?
            .unwrap_or_else(|| serde_json::json!([]));
        let mut items = current.as_array().cloned().unwrap_or_default();
        items.push(blob);
        tx.set(rt_store_core::reserved_keys::INCOMING, Value::Array(items))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Drain and return everything currently queued in `state.outgoing`.
    pub async fn drain_outgoing(&self) -> Result<Vec<Value>, RuntimeError> {
        let mut tx = self.store.begin_transaction().await?;
        let mut state = tx
            .get(rt_store_core::reserved_keys::STATE)
            .await?
            .unwrap_or_else(|| serde_json::json!({}));
        let drained = state
            .get("outgoing")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(object) = state.as_object_mut() {
            object.insert("outgoing".to_string(), Value::Array(vec![]));
        }
        tx.set(rt_store_core::reserved_keys::STATE, state).await?;
        tx.commit().await?;
        Ok(drained)
    }

    /// Advance time by one tick: drain `incoming`, run every
    /// handler-declared job, then replay the recheck queue.
    pub async fn tick(&self, time_now_ms: i64) -> Result<TickOutcome, RuntimeError> {
        let incoming_processed = self.decryptor.drain(time_now_ms).await?;
        let jobs = self.scheduler.tick(time_now_ms).await?;
        let recheck = self
            .recheck
            .process_unblocked(&self.drainer_identity, time_now_ms)
            .await?;
        Ok(TickOutcome {
            incoming_processed,
            jobs,
            recheck,
        })
    }

    /// The underlying store, for callers that need direct read access
    /// (introspection, tests).
    pub fn store(&self) -> Arc<dyn PersistentStore> {
        self.store.clone()
    }

    /// The dispatcher, for callers that want to project a preformed
    /// envelope without going through a command or the decryptor.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store.clone(), self.registry.clone())
    }
}

fn load_registry(handler_path: &str) -> Result<Registry, RuntimeError> {
    let path: PathBuf = handler_path.into();
    if !Path::new(&path).is_dir() {
        tracing::warn!(path = %handler_path, "handler path does not exist, starting with an empty registry");
        return Ok(Registry::empty());
    }
    Registry::load(&path).map_err(Into::into)
}
