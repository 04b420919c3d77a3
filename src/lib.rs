//! # timer-engine
//!
//! A distributed timer dispatch engine: timers are admitted into an
//! external Redis-class store under mutual exclusion, polled for
//! due entries, and dispatched to registered handlers with bounded
//! concurrency and a cluster-wide one-shot consume lease guarding each
//! dispatch attempt.
//!
//! ## Modules
//!
//! - [`config`]: engine settings, constructed once at startup.
//! - [`key`]: compound key construction (`topic` ⊕ separator ⊕ `timer_id`).
//! - [`lock`]: the two distributed lock flavors (timer lock, consume lease).
//! - [`store`]: the timeline/payload-map operations backing the scheduler
//!   and dispatch loop.
//! - [`codec`]: payload encoding and the pluggable [`codec::Schema`]
//!   validation contract.
//! - [`registry`]: the topic -> handler mapping ("router").
//! - [`dispatch`]: the per-timer dispatch state machine.
//! - [`stats`]: ambient dispatch counters.
//! - [`engine`]: ties the above into [`Engine`]'s construct/run/stop
//!   lifecycle and the `set_timer`/`remove_timer` scheduler API.

#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod key;
pub mod lock;
pub mod registry;
pub mod stats;
pub mod store;

pub use codec::{JsonSchema, Schema};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CodecError, LockError, RegistryError, TimerError, TimerResult};
pub use registry::{Handler, HandlerError, Route, Router};
pub use stats::EngineStats;

/// Crate version, as reported by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
