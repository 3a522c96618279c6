//! # Permsync Store
//!
//! Storage abstraction for permission state. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The engine never touches storage directly: every read and write goes
//! through [`PermissionStore`]. The primary implementation is
//! [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`PermissionStore`] - The async trait for all storage operations
//! - [`PermissionStoreExt`] - Queries composed from the trait
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use permsync_core::{PermissionGrant, PlayerId};
//! use permsync_store::{PermissionStore, SqliteStore};
//!
//! async fn example() -> permsync_store::Result<()> {
//!     let store = SqliteStore::open("permissions.db")?;
//!
//!     let player = PlayerId::random();
//!     store
//!         .add_player_permissions(player, &[PermissionGrant::permanent("world.build")])
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Read-time expiry**: expired rows are never returned by `now`-based reads
//! - **Upserts**: re-adding a key replaces its expiry
//! - **Referential checks**: memberships and group grants need an existing group
//! - **Cascading deletes**: deleting a group removes its grants and memberships

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PermissionStore, PermissionStoreExt};
