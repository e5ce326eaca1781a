//! Lifecycle tracking for streaming calls.
//!
//! Every streaming call (client, server, or bidirectional) holds a
//! [`StreamGuard`] for as long as it runs. The guard walks the call through
//! its states:
//!
//! ```text
//! OPEN ──► CLOSING ──► CLOSED
//!   │
//!   └────────────────► ABORTED
//! ```
//!
//! - `OPEN`: accepting inbound requests and/or emitting responses.
//! - `CLOSING`: the caller half-closed its side (or, for server streams, the
//!   final message was queued).
//! - `CLOSED`: normal termination.
//! - `ABORTED`: a lookup miss, transport error, client cancellation, or
//!   service shutdown ended the call. A guard dropped before reaching a
//!   terminal state counts as aborted, which covers tasks torn down by the
//!   runtime when the client disconnects.
//!
//! Guards are handed out by the service-wide [`StreamTracker`], which counts
//! in-flight streams and owns the shutdown [`CancellationToken`] every
//! streaming task listens on. [`StreamTracker::shutdown`] refuses new streams,
//! waits for the in-flight ones to drain, then cancels whatever is left.

use crate::server::telemetry::{
    decrement_streams_inflight, increment_stream_errors, increment_streams_inflight,
    record_stream_duration,
};
use core::time::Duration;
use greeter_tonic_core::{Error, Result};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closing,
    Closed,
    Aborted,
}

impl StreamState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

#[derive(Debug)]
struct Inner {
    inflight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

/// Service-wide registry of in-flight streaming calls.
///
/// Cheap to clone; clones share the same counters and shutdown token.
#[derive(Clone, Debug)]
pub struct StreamTracker {
    inner: Arc<Inner>,
}

impl StreamTracker {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                inflight: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
                shutdown_token: CancellationToken::new(),
                shutdown_timeout,
            }),
        }
    }

    /// Registers a new streaming call in the `OPEN` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin(&self, method: &'static str) -> Result<StreamGuard> {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        self.inner.inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();

        Ok(StreamGuard {
            tracker: self.clone(),
            method,
            state: StreamState::Open,
            started: Instant::now(),
        })
    }

    pub fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Resolves once the shutdown token has been cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.shutdown_token.cancelled()
    }

    /// Gracefully shuts down streaming.
    ///
    /// - Refuses new streams.
    /// - Waits up to the configured timeout for in-flight streams to finish.
    /// - Cancels the shared token so any remaining stream aborts with
    ///   [`Error::ServiceShutdown`].
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new streams ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new streams");
        self.inner.shutting_down.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight streams ({} active)", self.inflight());
        let drain_result = timeout(self.inner.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining streams ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.inner.shutdown_token.cancel();
    }
}

/// Per-call lifecycle handle. See the module docs for the state machine.
#[derive(Debug)]
pub struct StreamGuard {
    tracker: StreamTracker,
    method: &'static str,
    state: StreamState,
    started: Instant,
}

impl StreamGuard {
    #[cfg(test)]
    const fn state(&self) -> StreamState {
        self.state
    }

    /// `OPEN -> CLOSING`: the caller signalled end-of-input.
    pub fn closing(&mut self) {
        if self.state == StreamState::Open {
            self.state = StreamState::Closing;
        }
    }

    /// `OPEN | CLOSING -> CLOSED`.
    pub fn close(mut self) {
        self.finish(StreamState::Closed);
    }

    /// `OPEN | CLOSING -> ABORTED`, returning `err` so callers can forward it.
    pub fn abort(mut self, err: Error) -> Error {
        #[cfg(feature = "tracing")]
        tracing::debug!("{} aborted: {}", self.method, err);
        self.finish(StreamState::Aborted);
        err
    }

    fn finish(&mut self, state: StreamState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;

        self.tracker.inner.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
        record_stream_duration(self.method, self.started.elapsed().as_millis() as f64);
        if state == StreamState::Aborted {
            increment_stream_errors(self.method);
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            #[cfg(feature = "tracing")]
            tracing::debug!("{} dropped while {:?}", self.method, self.state);
            self.finish(StreamState::Aborted);
        }
    }
}
