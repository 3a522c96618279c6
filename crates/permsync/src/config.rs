//! Engine configuration.

use std::time::Duration;

pub use permsync_stream::BroadcastConfig;

/// Expiry scanner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Time between scans.
    pub scan_interval: Duration,
    /// How far before startup the first scan window reaches back.
    pub bootstrap_window: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            bootstrap_window: Duration::from_secs(60),
        }
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Broadcaster configuration.
    pub broadcast: BroadcastConfig,
    /// Expiry scanner configuration.
    pub scanner: ScannerConfig,
    /// Hold a per-player lock from snapshot-before to emit, so concurrent
    /// mutations of one player cannot interleave.
    pub serialize_player_mutations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broadcast: BroadcastConfig::default(),
            scanner: ScannerConfig::default(),
            serialize_player_mutations: true,
        }
    }
}
