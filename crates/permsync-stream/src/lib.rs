//! # Permsync Stream
//!
//! The outbound half of permission change propagation.
//!
//! ## Overview
//!
//! - [`ChangeEmitter`] decides between a delta event, a full-refresh event,
//!   or silence, and publishes the result.
//! - [`Broadcaster`] fans each event out to every attached [`Subscription`]
//!   over a bounded `tokio::sync::broadcast` channel (drop-oldest per
//!   lagging subscriber).
//! - [`EventFrame`] is the versioned CBOR encoding used by transports.
//!
//! ## Delivery
//!
//! At-least-once to subscribers attached at publish time, no persistence,
//! no replay. A subscriber that falls behind loses its own oldest events and
//! can see how many via [`Subscription::dropped`]; consumers should treat a
//! non-zero count as a cue to re-fetch.

pub mod broadcast;
pub mod emitter;
pub mod error;
pub mod frame;

pub use broadcast::{
    BroadcastConfig, Broadcaster, Subscription, DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
};
pub use emitter::{ChangeEmitter, Emission};
pub use error::{Result, StreamError};
pub use frame::{EventFrame, FRAME_VERSION};
