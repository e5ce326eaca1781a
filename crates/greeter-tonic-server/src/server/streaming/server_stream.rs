//! Server-streaming greetings (`SayHelloServerStream`).
//!
//! The single request is resolved and formatted once, before the response
//! stream is opened, so a lookup miss fails the call with `NOT_FOUND` and no
//! messages. Otherwise a background task emits between one and
//! `max_greet_count` numbered copies of the greeting, pausing `interval`
//! between consecutive messages to simulate a slow producer.

use super::{
    ResponseSender, forward_error,
    lifecycle::{StreamGuard, StreamTracker},
    send_response,
};
use core::time::Duration;
use greeter_tonic_core::{Error, Result, proto::SayHelloResponse};
use rand::Rng;
use tokio::time::sleep;

pub const METHOD: &str = "SayHelloServerStream";

/// Picks how many messages a call emits, uniformly from `1..=max`.
pub fn greet_count(max: usize) -> usize {
    rand::rng().random_range(1..=max.max(1))
}

/// Formats the `index`-th (1-based) message of a server stream.
pub fn numbered_greeting(greeting: &str, index: usize) -> String {
    format!("{greeting}. I greet {index} times.")
}

/// Emits `count` numbered greetings into `resp_tx`.
///
/// Runs as a spawned task that owns the call's [`StreamGuard`]. The loop stops
/// early when:
///
/// - the client drops the response stream ([`Error::RequestCancelled`]), or
/// - the service shuts down ([`Error::ServiceShutdown`], forwarded to the
///   client as `UNAVAILABLE`).
///
/// Both the pacing delay and the wait for channel capacity observe these
/// conditions, so the task never outlives its call.
pub async fn feed_greetings(
    greeting: String,
    count: usize,
    interval: Duration,
    resp_tx: ResponseSender,
    tracker: StreamTracker,
    mut guard: StreamGuard,
) -> Result<()> {
    for index in 1..=count {
        if index > 1 && !interval.is_zero() {
            let paced = tokio::select! {
                biased;
                () = tracker.cancelled() => Err(Error::ServiceShutdown),
                () = resp_tx.closed() => Err(Error::RequestCancelled),
                () = sleep(interval) => Ok(()),
            };
            if let Err(e) = paced {
                forward_error(&resp_tx, &e).await;
                return Err(guard.abort(e));
            }
        }

        let message = numbered_greeting(&greeting, index);
        let item = Ok(SayHelloResponse { message });
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
    use tokio::sync::mpsc;
    use tokio_stream::{StreamExt, wrappers::ReceiverStream};

    #[test]
    fn count_is_within_bounds() {
        for _ in 0..1_000 {
            let n = greet_count(5);
            assert!((1..=5).contains(&n), "count {n} out of range");
        }
        assert_eq!(greet_count(1), 1);
    }

    #[test]
    fn numbered_format() {
        assert_eq!(
            numbered_greeting("Hello, Smith!", 3),
            "Hello, Smith!. I greet 3 times."
        );
    }

    #[tokio::test]
    async fn emits_numbered_messages_then_closes() {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (tx, rx) = mpsc::channel(2);

        let task = tokio::spawn(feed_greetings(
            "Hello, Smith!".to_string(),
            4,
            Duration::ZERO,
            tx,
            tracker.clone(),
            guard,
        ));

        let messages: Vec<_> = ReceiverStream::new(rx)
            .map(|item| item.unwrap().message)
            .collect()
            .await;

        task.await.unwrap().unwrap();
        assert_eq!(
            messages,
            (1..=4)
                .map(|i| format!("Hello, Smith!. I greet {i} times."))
                .collect::<Vec<_>>()
        );
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_separates_consecutive_sends() {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let started = tokio::time::Instant::now();

        tokio::spawn(feed_greetings(
            "Hi".to_string(),
            3,
            Duration::from_secs(1),
            tx,
            tracker.clone(),
            guard,
        ));

        let mut arrivals = Vec::new();
        while let Some(item) = rx.recv().await {
            item.unwrap();
            arrivals.push(started.elapsed());
        }

        // No delay before the first message or after the last one.
        assert_eq!(arrivals.len(), 3);
        assert!(arrivals[0] < Duration::from_secs(1));
        assert!(arrivals[1] >= Duration::from_secs(1));
        assert!(arrivals[2] >= Duration::from_secs(2));
        assert!(arrivals[2] < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn stops_when_client_goes_away() {
        let tracker = StreamTracker::new(Duration::from_secs(1));
        let guard = tracker.begin(METHOD).unwrap();
        let (tx, mut rx) = mpsc::channel(1);

        let task = tokio::spawn(feed_greetings(
            "Hi".to_string(),
            5,
            Duration::from_secs(3600),
            tx,
            tracker.clone(),
            guard,
        ));

        rx.recv().await.unwrap().unwrap();
        drop(rx);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RequestCancelled));
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_forwards_unavailable() {
        let tracker = StreamTracker::new(Duration::ZERO);
        let guard = tracker.begin(METHOD).unwrap();
        let (tx, mut rx) = mpsc::channel(4);

        let task = tokio::spawn(feed_greetings(
            "Hi".to_string(),
            5,
            Duration::from_secs(3600),
            tx,
            tracker.clone(),
            guard,
        ));

        rx.recv().await.unwrap().unwrap();
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
        let (tx, mut rx) = mpsc::channel(1);

        let task = tokio::spawn(feed_greetings(
            "Hi".to_string(),
            5,
            Duration::from_secs(3600),
            tx.clone(),
            tracker.clone(),
            guard,
        ));

        // Wait until the first greeting occupies the only buffer slot.
        while tx.capacity() > 0 {
            tokio::task::yield_now().await;
        }
        drop(tx);
        tracker.shutdown().await;

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.message, "Hi. I greet 1 times.");
        let status = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert!(rx.recv().await.is_none());
        assert!(matches!(task.await.unwrap(), Err(Error::ServiceShutdown)));
    }
}
