//! Tick source
//!
//! A lazy, forward-only, cancelable sequence of tick values. The driving
//! loop pulls one value at a time; restarting after a pause means
//! creating a fresh source (the sequence cannot be rewound), while the
//! tick counter itself lives in the controller's shared state so a
//! resumed loop continues where the paused one stopped.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::cycle::controller::Shared;
use crate::cycle::event::TickPayload;
use crate::error::{Error, Result};

/// One pass over the poll sequence. Created per loop entry.
pub(crate) struct TickSource<C> {
    shared: Arc<Shared<C>>,
}

impl<C: Send + Sync + 'static> TickSource<C> {
    pub(crate) const fn new(shared: Arc<Shared<C>>) -> Self {
        Self { shared }
    }

    /// Produce the next tick value, or `None` once the stop count is
    /// exceeded.
    ///
    /// The counter is incremented once per attempt, including attempts
    /// that fail; the inclusive check against the pre-increment value
    /// means a finite stop count of `n` yields `n + 1` ticks. Errors are
    /// not caught here; they propagate to the driving loop and halt the
    /// cycle.
    pub(crate) async fn next(&mut self) -> Result<Option<TickPayload>> {
        let tick = self.shared.counter.fetch_add(1, Ordering::SeqCst);
        if let Some(stop) = self.shared.options.stop_count {
            if tick > stop {
                debug!(tick, stop, "stop count exceeded, sequence complete");
                return Ok(None);
            }
        }

        let interval = self.shared.options.interval;
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        let path = self
            .shared
            .fetch
            .lock()
            .expect("fetch config lock poisoned")
            .effective_path();

        match path {
            Some(path) => self.fetch_tick(&path).await.map(Some),
            // Ticker mode: the post-increment counter is the tick value.
            None => Ok(Some(TickPayload::Count(tick + 1))),
        }
    }

    /// Issue one poll request and parse the body as JSON.
    ///
    /// The request is raced against the controller's cancellation token;
    /// an abort surfaces here as [`Error::Cancelled`]. The HTTP status is
    /// deliberately not checked: like a browser `fetch`, a non-2xx JSON
    /// body is still a tick value.
    async fn fetch_tick(&self, path: &str) -> Result<TickPayload> {
        let url = Url::parse(path).map_err(|source| Error::invalid_path(path, source))?;

        let headers = self
            .shared
            .fetch
            .lock()
            .expect("fetch config lock poisoned")
            .options
            .headers
            .clone();

        let mut request = self.shared.client.get(url);
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        debug!(%path, "issuing poll request");
        let body = tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => return Err(Error::Cancelled),
            response = async { request.send().await?.json::<serde_json::Value>().await } => {
                response?
            }
        };

        Ok(TickPayload::Json(body))
    }
}
