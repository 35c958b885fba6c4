//! Logging and observability
//!
//! This module provides JSONL logging of delivered tick envelopes, used
//! by the CLI to keep poll history across runs.

pub mod jsonl;

pub use jsonl::{EnvelopeLog, EnvelopeRecord};
