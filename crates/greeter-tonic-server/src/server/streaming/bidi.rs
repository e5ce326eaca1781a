//! Bidirectional greetings (`SayHelloBidiStream`).
//!
//! Requests and responses flow concurrently over one call. Each inbound
//! request is resolved as soon as it arrives and answered with exactly one
//! greeting; nothing is accumulated across requests.
//!
//! - Caller half-close ends the call normally. No response is produced after
//!   that point.
//! - A request naming an absent user ends the call with `NOT_FOUND`.
//!   Responses already queued for earlier requests are still delivered; the
//!   failing request gets no response of its own.

use super::{
    ResponseSender, forward_error,
    lifecycle::{StreamGuard, StreamTracker},
    send_response,
};
use crate::server::{service::greeter::resolve_greeting, store::RecordStore};
use greeter_tonic_core::{
    Error, Result,
    proto::{SayHelloRequest, SayHelloResponse},
};
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

pub const METHOD: &str = "SayHelloBidiStream";

/// Answers every request on `inbound` until end-of-input.
///
/// Runs as a spawned task that owns the call's [`StreamGuard`]. Waiting for
/// the next request also watches for the client dropping the response stream
/// and for service shutdown.
pub async fn relay_greetings<S>(
    mut inbound: S,
    store: RecordStore,
    resp_tx: ResponseSender,
    tracker: StreamTracker,
    mut guard: StreamGuard,
) -> Result<()>
where
    S: Stream<Item = core::result::Result<SayHelloRequest, Status>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = tracker.cancelled() => {
                let err = Error::ServiceShutdown;
                forward_error(&resp_tx, &err).await;
                return Err(guard.abort(err));
            }
            () = resp_tx.closed() => return Err(guard.abort(Error::RequestCancelled)),
            next = inbound.next() => next,
        };

        let req = match next {
            Some(Ok(req)) => req,
            // The client reset its side; there is nobody left to tell.
            Some(Err(status)) => return Err(guard.abort(status.into())),
            None => break,
        };

        let item = match resolve_greeting(&store, &req.greeter_name) {
            Ok(message) => Ok(SayHelloResponse { message }),
            Err(e) => {
                // Queue the status behind earlier responses so they are
                // delivered first.
                let status: Status = e.clone().into();
                if let Err(send_err) = send_response(&resp_tx, &tracker, METHOD, Err(status)).await {
                    forward_error(&resp_tx, &send_err).await;
                }
                return Err(guard.abort(e));
            }
        };

        if let Err(e) = send_response(&resp_tx, &tracker, METHOD, item).await {
            forward_error(&resp_tx, &e).await;
            return Err(guard.abort(e));
        }
    }

    guard.closing();
    guard.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use greeter_tonic_core::proto::{Language, User};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    fn store() -> RecordStore {
        let store = RecordStore::new();
        for (first, last, language) in [
            ("Jane", "Smith", Language::English),
            ("Taro", "Yamada", Language::Japanese),
        ] {
            let user = User {
                name: format!("{first}_{last}"),
                first_name: first.to_string(),
                last_name: last.to_string(),
                language: language as i32,
                display_name: None,
            };
            store.put(user.name.clone(), user);
        }
        store
    }

    fn req(key: &str) -> core::result::Result<SayHelloRequest, Status> {
        Ok(SayHelloRequest {
            greeter_name: key.to_string(),
        })
    }

    async fn run(
        inbound: Vec<core::result::Result<SayHelloRequest, Status>>,
    ) -> (Vec<core::result::Result<SayHelloResponse, Status>>, Result<()>, StreamTracker) {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(relay_greetings(
            tokio_stream::iter(inbound),
            store(),
            tx,
            tracker.clone(),
            guard,
        ));
        let out: Vec<_> = ReceiverStream::new(rx).collect().await;
        (out, task.await.unwrap(), tracker)
    }

    #[tokio::test]
    async fn answers_each_request_in_its_own_locale() {
        let (out, result, tracker) = run(vec![req("Jane_Smith"), req("Taro_Yamada")]).await;

        result.unwrap();
        let messages: Vec<_> = out.into_iter().map(|r| r.unwrap().message).collect();
        assert_eq!(messages, ["Hello, Smith!", "こんにちは、Yamada！"]);
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn empty_inbound_closes_without_responses() {
        let (out, result, _) = run(vec![]).await;
        result.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_user_keeps_prior_responses_and_stops() {
        let (out, result, tracker) =
            run(vec![req("Jane_Smith"), req("ghost"), req("Taro_Yamada")]).await;

        assert!(matches!(result, Err(Error::NotFound { ref key }) if key == "ghost"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().message, "Hello, Smith!");
        let status = out[1].as_ref().unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert_eq!(status.message(), "no such user: ghost");
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn inbound_transport_error_aborts() {
        let (out, result, _) = run(vec![req("Jane_Smith"), Err(Status::cancelled("reset"))]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn responses_flow_before_half_close() {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (in_tx, in_rx) = mpsc::channel(1);
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(relay_greetings(
            ReceiverStream::new(in_rx),
            store(),
            tx,
            tracker.clone(),
            guard,
        ));

        in_tx.send(req("Jane_Smith")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap().message, "Hello, Smith!");
        in_tx.send(req("Taro_Yamada")).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().unwrap().message,
            "こんにちは、Yamada！"
        );

        drop(in_tx);
        assert!(rx.recv().await.is_none());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn client_dropping_responses_ends_task() {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (_in_tx, in_rx) = mpsc::channel::<core::result::Result<SayHelloRequest, Status>>(1);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(relay_greetings(
            ReceiverStream::new(in_rx),
            store(),
            tx,
            tracker.clone(),
            guard,
        ));

        drop(rx);
        assert!(matches!(task.await.unwrap(), Err(Error::RequestCancelled)));
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_open_stream_with_unavailable() {
        let tracker = StreamTracker::new(Duration::ZERO);
        let guard = tracker.begin(METHOD).unwrap();
        let (_in_tx, in_rx) = mpsc::channel::<core::result::Result<SayHelloRequest, Status>>(1);
        let (tx, mut rx) = mpsc::channel(8);
        let task = tokio::spawn(relay_greetings(
            ReceiverStream::new(in_rx),
            store(),
            tx,
            tracker.clone(),
            guard,
        ));

        tracker.shutdown().await;

        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(rx.recv().await.is_none());
        assert!(matches!(task.await.unwrap(), Err(Error::ServiceShutdown)));
    }

    #[tokio::test]
    async fn shutdown_with_full_buffer_still_reports_unavailable() {
        let tracker = StreamTracker::new(Duration::ZERO);
        let guard = tracker.begin(METHOD).unwrap();
        let (in_tx, in_rx) = mpsc::channel(1);
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(relay_greetings(
            ReceiverStream::new(in_rx),
            store(),
            tx.clone(),
            tracker.clone(),
            guard,
        ));

        in_tx.send(req("Jane_Smith")).await.unwrap();
        while tx.capacity() > 0 {
            tokio::task::yield_now().await;
        }
        drop(tx);
        tracker.shutdown().await;

        assert_eq!(rx.recv().await.unwrap().unwrap().message, "Hello, Smith!");
        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(rx.recv().await.is_none());
        assert!(matches!(task.await.unwrap(), Err(Error::ServiceShutdown)));
        drop(in_tx);
    }
}
