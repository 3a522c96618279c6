//! Shared setup for engine scenario tests.

#![allow(dead_code)]

pub mod gated;

use std::sync::{Arc, Once};

use permsync::core::Clock;
use permsync::store::{MemoryStore, PermissionStore, SqliteStore};
use permsync::{EngineConfig, PermissionEngine};
use permsync_testkit::{ManualClock, T0};
use tempfile::TempDir;

use self::gated::GatedStore;

const DB_FILE: &str = "permissions.db";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// An engine on a manual clock starting at `T0`.
pub struct Harness<S: PermissionStore> {
    pub engine: PermissionEngine<S>,
    pub clock: Arc<ManualClock>,
    /// Keeps a file-backed database alive for the test.
    pub dir: Option<TempDir>,
}

impl<S: PermissionStore + 'static> Harness<S> {
    fn build(store: S, config: EngineConfig, dir: Option<TempDir>) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(T0));
        let shared: Arc<dyn Clock> = clock.clone();
        let engine = PermissionEngine::with_clock(store, shared, config);
        Self { engine, clock, dir }
    }
}

pub fn memory() -> Harness<MemoryStore> {
    memory_with(EngineConfig::default())
}

pub fn memory_with(config: EngineConfig) -> Harness<MemoryStore> {
    Harness::build(MemoryStore::new(), config, None)
}

pub fn gated_with(config: EngineConfig) -> Harness<GatedStore> {
    Harness::build(GatedStore::new(), config, None)
}

pub fn sqlite() -> Harness<SqliteStore> {
    sqlite_with(EngineConfig::default())
}

pub fn sqlite_with(config: EngineConfig) -> Harness<SqliteStore> {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join(DB_FILE)).unwrap();
    Harness::build(store, config, Some(dir))
}

/// A second store over the same database file.
pub fn reopen(h: &Harness<SqliteStore>) -> SqliteStore {
    let dir = h.dir.as_ref().unwrap();
    SqliteStore::open(dir.path().join(DB_FILE)).unwrap()
}
