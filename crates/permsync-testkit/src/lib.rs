//! # Permsync Testkit
//!
//! Testing utilities for permsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a manual clock, deterministic player ids, store seeding
//!   and a model consumer cache
//! - **Generators**: Proptest strategies for grants, memberships and
//!   player row sets
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use permsync_core::{diff, DeltaDimensions, PlayerId};
//! use permsync_testkit::generators::{PlayerRows, NOW};
//!
//! proptest! {
//!     #[test]
//!     fn diff_of_self_is_empty(rows: PlayerRows) {
//!         let s = rows.snapshot(PlayerId::random(), NOW);
//!         prop_assert!(diff(&s, &s, DeltaDimensions::ALL).is_empty());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Drive time by hand and check what a consumer would end up caching:
//!
//! ```rust
//! use permsync_core::Clock;
//! use permsync_testkit::fixtures::{ManualClock, T0};
//!
//! let clock = ManualClock::default();
//! clock.advance(5_000);
//! assert_eq!(clock.now_millis(), T0 + 5_000);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    drain, events_for, player, seed_group, CachedPlayer, ConsumerCache, ManualClock, T0,
};
pub use generators::PlayerRows;
