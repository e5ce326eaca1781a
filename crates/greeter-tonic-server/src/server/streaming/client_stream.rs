//! Client-streaming aggregation (`SayHelloClientStream`).
//!
//! The caller streams any number of `SayHelloRequest`s. Each one is resolved
//! against the store as it arrives and the user's surname is appended to an
//! ordered list. When the caller half-closes, a single response greets the
//! comma-joined surnames with the English template; the per-user locale is
//! not tracked in this shape.
//!
//! A request naming an absent user ends the call immediately with
//! `NOT_FOUND`. Surnames accumulated so far are discarded and no response is
//! sent.

use super::lifecycle::StreamTracker;
use crate::server::store::RecordStore;
use greeter_tonic_core::{
    Error, Result,
    greeting::format_greeting,
    proto::{Language, SayHelloRequest, SayHelloResponse},
};
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

pub const METHOD: &str = "SayHelloClientStream";

/// Separator placed between surnames in the aggregated greeting.
pub const SURNAME_SEPARATOR: &str = ", ";

/// Consumes `inbound` until end-of-input and returns the aggregated greeting.
///
/// # Errors
///
/// - [`Error::NotFound`] for the first request naming an absent user.
/// - [`Error::Transport`] if the inbound stream fails.
/// - [`Error::ServiceShutdown`] if shutdown begins before or during the call.
pub async fn aggregate_greetings<S>(
    mut inbound: S,
    store: &RecordStore,
    tracker: &StreamTracker,
) -> Result<SayHelloResponse>
where
    S: Stream<Item = core::result::Result<SayHelloRequest, Status>> + Unpin,
{
    let mut guard = tracker.begin(METHOD)?;
    let mut surnames = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            () = tracker.cancelled() => return Err(guard.abort(Error::ServiceShutdown)),
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(req)) => match store.get(&req.greeter_name) {
                Ok(user) => surnames.push(user.last_name),
                Err(e) => return Err(guard.abort(e)),
            },
            Some(Err(status)) => return Err(guard.abort(status.into())),
            None => break,
        }
    }

    guard.closing();
    let message = format_greeting(&surnames.join(SURNAME_SEPARATOR), Language::English as i32);
    guard.close();

    Ok(SayHelloResponse { message })
}
