//! Pulse - Client-side polling with observer fan-out
//!
//! Pulse drives timed fetch (or counter) cycles and broadcasts each tick
//! to registered observers, with pause/resume/abort transitions and
//! lifecycle hooks. An HTTP resource path turns a cycle into a poller;
//! without one it is a plain ticker.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod cli;
pub mod cycle;
pub mod error;
pub mod log;

// Re-export commonly used types
pub use cli::TickDisplay;
pub use cycle::config::{
    async_hook, hook, CycleOptions, FetchOptions, LifecycleHook, PathAccessor, PollConfig,
    PulseConfig,
};
pub use cycle::controller::{CycleController, CycleHandle, RunState};
pub use cycle::event::{Envelope, TickPayload, EVENT_TYPE};
pub use cycle::observer::{observer, Observer};
pub use error::{Error, Result};
pub use log::{EnvelopeLog, EnvelopeRecord};
