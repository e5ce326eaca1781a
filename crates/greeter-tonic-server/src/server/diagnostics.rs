//! Diagnostic HTTP endpoint.
//!
//! Served on its own listener (`--diag-addr`), separate from the gRPC port, so
//! operators can probe the process with plain `curl`:
//!
//! - `GET /healthz` -> `ok`
//! - `GET /debug/stats` -> JSON snapshot of the store size and in-flight
//!   streams.

use crate::server::{store::RecordStore, streaming::lifecycle::StreamTracker};
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct DiagState {
    pub store: RecordStore,
    pub tracker: StreamTracker,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub records: usize,
    pub streams_inflight: usize,
    pub shutting_down: bool,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn stats(State(state): State<DiagState>) -> Json<Stats> {
    Json(Stats {
        records: state.store.len(),
        streams_inflight: state.tracker.inflight(),
        shutting_down: state.tracker.is_shutting_down(),
    })
}

pub fn router(state: DiagState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/debug/stats", get(stats))
        .with_state(state)
}

/// Serves the diagnostic router on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: DiagState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled_owned().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use core::time::Duration;
    use greeter_tonic_core::proto::User;
    use tower::ServiceExt;

    fn state() -> DiagState {
        DiagState {
            store: RecordStore::new(),
            tracker: StreamTracker::new(Duration::ZERO),
        }
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let resp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (status, body) = get_body(router(state()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn stats_reflect_store_and_streams() {
        let state = state();
        state.store.put(
            "Jane_Smith",
            User {
                name: "Jane_Smith".to_string(),
                ..User::default()
            },
        );
        let _guard = state.tracker.begin("test").unwrap();

        let (status, body) = get_body(router(state.clone()), "/debug/stats").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "records": 1,
                "streams_inflight": 1,
                "shutting_down": false,
            })
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _) = get_body(router(state()), "/debug/pprof").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, state(), token.clone()));
        token.cancel();
        server.await.unwrap().unwrap();
    }
}
