//! Cycle configuration
//!
//! Runtime options for a poll cycle (stop count, interval, lifecycle
//! hooks) plus named poll profiles parsed from `pulse.toml`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// A lifecycle callback, invoked with an explicit execution context and
/// awaited before the associated transition completes.
pub type LifecycleHook<C> = Arc<dyn Fn(&C) -> BoxFuture<'static, ()> + Send + Sync>;

/// Computes the effective resource path for one tick.
///
/// Evaluated fresh on every tick with the context supplied when the
/// accessor was installed. Returning `None` (or an empty string) selects
/// ticker mode for that tick.
pub type PathAccessor<C> = Arc<dyn Fn(&C) -> Option<String> + Send + Sync>;

/// Wrap a synchronous callback as a [`LifecycleHook`].
pub fn hook<C, F>(f: F) -> LifecycleHook<C>
where
    F: Fn(&C) + Send + Sync + 'static,
{
    Arc::new(move |context| {
        f(context);
        Box::pin(std::future::ready(()))
    })
}

/// Wrap a future-producing callback as a [`LifecycleHook`].
///
/// The produced future is awaited before the transition completes, so a
/// slow resume hook delays re-entry into the tick loop.
pub fn async_hook<C, F, Fut>(f: F) -> LifecycleHook<C>
where
    F: Fn(&C) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |context| Box::pin(f(context)))
}

/// Fetch parameters for one controller instance: the static resource
/// path (empty selects ticker mode) and request headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchOptions {
    /// Resource URI, or empty when a path accessor (or ticker mode) is used.
    #[serde(default)]
    pub path: String,
    /// Headers attached to every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl FetchOptions {
    /// Fetch options for ticker mode (no resource path).
    #[must_use]
    pub fn ticker() -> Self {
        Self::default()
    }

    /// Fetch options for a static resource path.
    #[must_use]
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
        }
    }
}

/// Options controlling one poll cycle.
///
/// Immutable after construction; hooks are invoked with the context
/// passed to the operation that triggered them.
pub struct CycleOptions<C> {
    /// Number of ticks before natural termination; `None` runs forever.
    ///
    /// The boundary check is inclusive against the pre-increment counter,
    /// so a finite `Some(n)` produces `n + 1` ticks.
    pub stop_count: Option<u64>,
    /// Delay before each tick. Zero skips the suspension entirely.
    pub interval: Duration,
    /// Invoked after the transition to Paused.
    pub on_before_pause: Option<LifecycleHook<C>>,
    /// Invoked and awaited before a paused loop re-enters Running.
    pub on_before_resume: Option<LifecycleHook<C>>,
    /// Invoked after abort has set Inactive, cancelled the in-flight
    /// operation, and cleared the observer set.
    pub on_before_abort: Option<LifecycleHook<C>>,
    /// Invoked when an unsubscribe call empties the observer set.
    pub on_no_observers: Option<LifecycleHook<C>>,
}

impl<C> Default for CycleOptions<C> {
    fn default() -> Self {
        Self {
            stop_count: Some(1),
            interval: Duration::ZERO,
            on_before_pause: None,
            on_before_resume: None,
            on_before_abort: None,
            on_no_observers: None,
        }
    }
}

impl<C> CycleOptions<C> {
    /// Options for an unbounded cycle with the given interval.
    #[must_use]
    pub fn forever(interval: Duration) -> Self {
        Self {
            stop_count: None,
            interval,
            ..Self::default()
        }
    }
}

/// Resolved fetch configuration owned by a controller: the static
/// options plus the optional per-tick path accessor.
pub(crate) struct FetchConfig<C> {
    pub(crate) options: FetchOptions,
    /// The accessor and the context it was installed with.
    /// Last write wins; installing a new accessor replaces the old one.
    pub(crate) accessor: Option<(PathAccessor<C>, Arc<C>)>,
}

impl<C> FetchConfig<C> {
    pub(crate) const fn new(options: FetchOptions) -> Self {
        Self {
            options,
            accessor: None,
        }
    }

    /// Resolve the effective resource path for the current tick.
    ///
    /// The accessor, when installed, is consulted on every call and may
    /// legitimately return a different path each tick. Empty paths
    /// normalise to `None` (ticker mode).
    pub(crate) fn effective_path(&self) -> Option<String> {
        let path = match &self.accessor {
            Some((accessor, context)) => accessor(context),
            None => Some(self.options.path.clone()),
        };
        path.filter(|p| !p.is_empty())
    }
}

const fn default_stop_count() -> u64 {
    1
}

/// A named poll definition from `pulse.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    /// Unique name for this poll.
    pub name: String,
    /// Resource URI; empty (or omitted) selects ticker mode.
    #[serde(default)]
    pub path: String,
    /// Headers attached to every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Number of ticks before natural termination (default: 1).
    #[serde(default = "default_stop_count")]
    pub stop_count: u64,
    /// Run forever, ignoring `stop_count`.
    #[serde(default)]
    pub forever: bool,
    /// Interval in seconds between ticks (default: 0).
    #[serde(default)]
    pub interval_seconds: f64,
}

impl PollConfig {
    /// The fetch parameters for this poll.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            path: self.path.clone(),
            headers: self.headers.clone(),
        }
    }

    /// The cycle options for this poll, with no hooks installed.
    pub fn cycle_options<C>(&self) -> Result<CycleOptions<C>> {
        let interval = Duration::try_from_secs_f64(self.interval_seconds).map_err(|_| {
            Error::config(format!(
                "poll '{}': interval_seconds must be a non-negative number",
                self.name
            ))
        })?;

        Ok(CycleOptions {
            stop_count: if self.forever {
                None
            } else {
                Some(self.stop_count)
            },
            interval,
            ..CycleOptions::default()
        })
    }
}

/// Top-level configuration parsed from `pulse.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PulseConfig {
    /// Poll definitions.
    #[serde(rename = "poll")]
    pub polls: Vec<PollConfig>,
}

impl PulseConfig {
    /// Parse a `pulse.toml` file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse `pulse.toml` content from a string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse pulse.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Find a poll by name.
    #[must_use]
    pub fn get_poll(&self, name: &str) -> Option<&PollConfig> {
        self.polls.iter().find(|p| p.name == name)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for poll in &self.polls {
            if poll.name.trim().is_empty() {
                return Err(Error::config("poll name cannot be empty"));
            }
            if !seen.insert(&poll.name) {
                return Err(Error::config(format!(
                    "duplicate poll name: '{}'",
                    poll.name
                )));
            }
            if !poll.forever && poll.stop_count == 0 {
                return Err(Error::config(format!(
                    "poll '{}': stop_count must be a positive integer",
                    poll.name
                )));
            }
            if !poll.interval_seconds.is_finite() || poll.interval_seconds < 0.0 {
                return Err(Error::config(format!(
                    "poll '{}': interval_seconds must be a non-negative number",
                    poll.name
                )));
            }
            if !poll.path.is_empty() {
                Url::parse(&poll.path).map_err(|e| {
                    Error::config(format!(
                        "poll '{}': invalid path '{}': {e}",
                        poll.name, poll.path
                    ))
                })?;
            }
        }
        Ok(())
    }
}
