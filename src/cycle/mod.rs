//! Poll-cycle engine
//!
//! A [`controller::CycleController`] drives timed fetch (or counter)
//! iterations from a spawned loop, broadcasting each tick to registered
//! observers. Configuration comes from [`config`], tick values are
//! wrapped by [`event`], and the per-tick sequence itself lives in
//! [`source`].

pub mod config;
pub mod controller;
pub mod event;
pub mod observer;
pub(crate) mod source;
