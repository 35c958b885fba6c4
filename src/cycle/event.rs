//! Tick event envelope
//!
//! Every tick produced by the driving loop is wrapped in an [`Envelope`]
//! before being broadcast to observers. Envelopes are created fresh per
//! tick and are not retained by the core after dispatch.

use serde::Serialize;

/// Event tag carried by every envelope this crate emits.
pub const EVENT_TYPE: &str = "pulse";

/// The raw value produced by one tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TickPayload {
    /// The tick counter, emitted in ticker mode (no resource path).
    Count(u64),
    /// The parsed JSON body of the polled resource.
    Json(serde_json::Value),
}

impl TickPayload {
    /// The counter value, if this is a ticker-mode payload.
    #[must_use]
    pub const fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Json(_) => None,
        }
    }

    /// The JSON body, if this is a fetch payload.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Count(_) => None,
            Self::Json(v) => Some(v),
        }
    }
}

/// The notification payload delivered to observers, one per tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    /// Fixed tag identifying this crate's events.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// Epoch milliseconds at which the envelope was created.
    pub timestamp: i64,
    /// The raw tick payload.
    pub response: TickPayload,
}

impl Envelope {
    /// Wrap a tick payload, stamping it with the current time.
    #[must_use]
    pub fn new(response: TickPayload) -> Self {
        Self {
            event_type: EVENT_TYPE,
            timestamp: chrono::Utc::now().timestamp_millis(),
            response,
        }
    }
}
