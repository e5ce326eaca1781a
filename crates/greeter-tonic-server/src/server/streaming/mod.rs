//! Streaming call shapes of the greeter service.
//!
//! Each streaming call is modelled as two independent sequences: the inbound
//! requests produced by the caller (any `Stream` of `SayHelloRequest`, which
//! is what `tonic::Streaming` is) and the outbound responses produced by the
//! handler, pushed into a bounded [`mpsc`] channel and handed to tonic as a
//! [`ResponseStream`]. The bound gives backpressure: a producer waits for
//! capacity when the client stops reading.
//!
//! Every suspension point (awaiting the next inbound item, awaiting channel
//! capacity, pacing between messages) also listens for the caller going away
//! and for the service shutdown token, so no task outlives its call.
//!
//! ## Submodules
//!
//! - [`lifecycle`] - per-call state machine and in-flight tracking.
//! - [`client_stream`] - N requests, one aggregated response.
//! - [`server_stream`] - one request, a paced run of numbered responses.
//! - [`bidi`] - one response per request, as requests arrive.

pub mod bidi;
pub mod client_stream;
pub mod lifecycle;
pub mod server_stream;

use crate::server::telemetry::increment_messages_sent;
use core::pin::Pin;
use core::time::Duration;
use greeter_tonic_core::{Error, Result, proto::SayHelloResponse};
use lifecycle::StreamTracker;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tonic::Status;

/// Outbound half handed to tonic for server and bidirectional streams.
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = core::result::Result<SayHelloResponse, Status>> + Send>>;

/// Producer side of a [`ResponseStream`].
pub type ResponseSender = mpsc::Sender<core::result::Result<SayHelloResponse, Status>>;

/// How long a terminal error status may wait for room in a full response
/// buffer before it is given up.
pub const ERROR_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Waits for capacity and queues `item` on the response channel.
///
/// # Errors
///
/// - [`Error::RequestCancelled`] if the client dropped the response stream.
/// - [`Error::ServiceShutdown`] if the shutdown token fires first.
pub(crate) async fn send_response(
    resp_tx: &ResponseSender,
    tracker: &StreamTracker,
    method: &'static str,
    item: core::result::Result<SayHelloResponse, Status>,
) -> Result<()> {
    let delivered_ok = item.is_ok();
    tokio::select! {
        biased;
        () = tracker.cancelled() => Err(Error::ServiceShutdown),
        res = resp_tx.send(item) => match res {
            Ok(()) => {
                if delivered_ok {
                    increment_messages_sent(method);
                }
                Ok(())
            }
            Err(_) => Err(Error::RequestCancelled),
        },
    }
}

/// Delivers a terminal error status to the client.
///
/// The status is queued behind any responses still buffered, waiting up to
/// [`ERROR_DELIVERY_TIMEOUT`] for capacity so a full buffer does not turn an
/// aborted call into what looks like a clean end of stream. Cancellation needs
/// no status since nobody is listening.
pub(crate) async fn forward_error(resp_tx: &ResponseSender, err: &Error) {
    if matches!(err, Error::RequestCancelled) {
        return;
    }

    if let Err(_e) = resp_tx
        .send_timeout(Err(err.clone().into()), ERROR_DELIVERY_TIMEOUT)
        .await
    {
        #[cfg(feature = "tracing")]
        tracing::debug!("Response channel failed to forward error: {}", _e);
    }
}
