//! # Permsync
//!
//! The unified API for permission change propagation: admin writes in,
//! per-player change events out.
//!
//! ## Overview
//!
//! Game servers cache each player's effective permissions. Permsync keeps
//! those caches correct without polling:
//!
//! - **Mutations**: every admin write captures the affected players'
//!   snapshots before and after, and emits the difference
//! - **Group fan-out**: a change to a group's grants reaches every active
//!   member as an effective-permission delta
//! - **Expiry**: a scanner turns lapsed grants and memberships into
//!   full-refresh events
//! - **Subscriptions**: consumers attach to a live stream; a resuming
//!   consumer gets refreshes for every active player
//!
//! ## Key Concepts
//!
//! - **Snapshot**: a player's active direct grants, memberships and
//!   effective permissions at one instant
//! - **Delta**: the ADD/REMOVE entries between two snapshots
//! - **Refresh**: an event with no deltas telling the consumer to re-read
//! - **Read-time expiry**: expired rows stay stored but are never active
//!
//! ## Usage
//!
//! ```rust,no_run
//! use permsync::{EngineConfig, PermissionEngine};
//! use permsync::core::{GroupMembership, PermissionGrant, PlayerId};
//! use permsync::store::SqliteStore;
//!
//! async fn example() -> permsync::Result<()> {
//!     let store = SqliteStore::open("permissions.db")?;
//!     let engine = PermissionEngine::new(store, EngineConfig::default());
//!
//!     let mut events = engine.subscribe("lobby-1", None).await?;
//!
//!     engine.create_group("builders").await?;
//!     engine
//!         .add_group_permissions("builders", [PermissionGrant::permanent("world.build")])
//!         .await?;
//!
//!     let player = PlayerId::random();
//!     engine
//!         .add_player_groups(player, [GroupMembership::permanent("builders")])
//!         .await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}", event.player_id, event.reason);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `permsync::core` - Grants, snapshots, deltas and events
//! - `permsync::store` - Storage abstraction, SQLite and in-memory stores
//! - `permsync::stream` - Broadcaster, emitter and wire frames

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod reader;
pub mod scanner;

// Re-export component crates
pub use permsync_core as core;
pub use permsync_store as store;
pub use permsync_stream as stream;

// Re-export main types for convenience
pub use config::{BroadcastConfig, EngineConfig, ScannerConfig};
pub use engine::PermissionEngine;
pub use error::{EngineError, Result};
pub use reader::SnapshotReader;
pub use scanner::{ExpiryScanner, ScanCursor, ScanReport, ScanWindow};

// Re-export commonly used core types
pub use permsync_core::{
    ApplyOutcome, ChangeEvent, DeltaAction, DeltaEntry, GroupMembership, PermissionGrant,
    PermissionGroup, PermissionSnapshot, PlayerId, SnapshotScope,
};
pub use permsync_stream::Subscription;
