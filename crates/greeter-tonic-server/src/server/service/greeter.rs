//! gRPC implementation of `GreeterService`.
//!
//! [`GreetingService`] greets stored users using the four RPC shapes. Each
//! handler resolves users through the shared [`RecordStore`]; a lookup miss
//! ends the call with `NOT_FOUND`.
//!
//! ## Responsibilities
//!
//! - Unary `SayHello`: resolve, format, reply.
//! - Client-streaming: delegate to [`aggregate_greetings`].
//! - Server-streaming: resolve once up front, then spawn [`feed_greetings`].
//! - Bidirectional: spawn [`relay_greetings`] over the inbound stream.
//!
//! The streaming entry points are also exposed as inherent methods that take
//! any inbound `Stream`, so they can be driven without a transport.

use crate::server::{
    config::ServerConfig,
    store::RecordStore,
    streaming::{
        ResponseStream,
        bidi::{self, relay_greetings},
        client_stream::{self, aggregate_greetings},
        lifecycle::StreamTracker,
        server_stream::{self, feed_greetings, greet_count},
    },
    telemetry::increment_requests,
};
use greeter_tonic_core::{
    Result,
    greeting::format_greeting,
    proto::{SayHelloRequest, SayHelloResponse, greeter_service_server::GreeterService},
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// Resolves `key` to a stored user and renders that user's greeting.
///
/// # Errors
///
/// Returns `Error::NotFound` when no user is stored under `key`.
pub fn resolve_greeting(store: &RecordStore, key: &str) -> Result<String> {
    let user = store.get(key)?;
    Ok(format_greeting(&user.last_name, user.language))
}

#[derive(Clone)]
pub struct GreetingService {
    config: ServerConfig,
    store: RecordStore,
    tracker: StreamTracker,
}

impl GreetingService {
    pub const fn new(config: ServerConfig, store: RecordStore, tracker: StreamTracker) -> Self {
        Self {
            config,
            store,
            tracker,
        }
    }

    pub fn say_hello_once(&self, req: &SayHelloRequest) -> Result<SayHelloResponse> {
        let message = resolve_greeting(&self.store, &req.greeter_name)?;
        Ok(SayHelloResponse { message })
    }

    pub async fn client_stream<S>(&self, inbound: S) -> Result<SayHelloResponse>
    where
        S: Stream<Item = core::result::Result<SayHelloRequest, Status>> + Unpin,
    {
        aggregate_greetings(inbound, &self.store, &self.tracker).await
    }

    /// Opens a server stream for `req`.
    ///
    /// The lookup happens before anything is spawned, so a missing user fails
    /// the call itself rather than the stream.
    pub fn server_stream(&self, req: &SayHelloRequest) -> Result<ResponseStream> {
        let guard = self.tracker.begin(server_stream::METHOD)?;
        let greeting = match resolve_greeting(&self.store, &req.greeter_name) {
            Ok(greeting) => greeting,
            Err(e) => return Err(guard.abort(e)),
        };
        let count = greet_count(self.config.max_greet_count);

        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let fut = feed_greetings(
            greeting,
            count,
            self.config.greet_interval,
            resp_tx,
            self.tracker.clone(),
            guard,
        );
        spawn_stream_task(fut);

        Ok(Box::pin(ReceiverStream::new(resp_rx)))
    }

    pub fn bidi_stream<S>(&self, inbound: S) -> Result<ResponseStream>
    where
        S: Stream<Item = core::result::Result<SayHelloRequest, Status>> + Unpin + Send + 'static,
    {
        let guard = self.tracker.begin(bidi::METHOD)?;

        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        let fut = relay_greetings(
            inbound,
            self.store.clone(),
            resp_tx,
            self.tracker.clone(),
            guard,
        );
        spawn_stream_task(fut);

        Ok(Box::pin(ReceiverStream::new(resp_rx)))
    }
}

fn spawn_stream_task<F>(fut: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let fut = async move {
        if let Err(_e) = fut.await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Stream ended early: {}", _e);
        }
    };
    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        fut.instrument(tracing::info_span!("streaming"))
    };

    tokio::spawn(fut);
}

#[tonic::async_trait]
impl GreeterService for GreetingService {
    type SayHelloServerStreamStream = ResponseStream;
    type SayHelloBidiStreamStream = ResponseStream;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(greeter = %req.get_ref().greeter_name)))]
    async fn say_hello(
        &self,
        req: Request<SayHelloRequest>,
    ) -> core::result::Result<Response<SayHelloResponse>, Status> {
        increment_requests("SayHello");
        Ok(Response::new(self.say_hello_once(req.get_ref())?))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn say_hello_client_stream(
        &self,
        req: Request<Streaming<SayHelloRequest>>,
    ) -> core::result::Result<Response<SayHelloResponse>, Status> {
        increment_requests(client_stream::METHOD);
        let resp = self.client_stream(req.into_inner()).await?;
        Ok(Response::new(resp))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(greeter = %req.get_ref().greeter_name)))]
    async fn say_hello_server_stream(
        &self,
        req: Request<SayHelloRequest>,
    ) -> core::result::Result<Response<Self::SayHelloServerStreamStream>, Status> {
        increment_requests(server_stream::METHOD);
        Ok(Response::new(self.server_stream(req.get_ref())?))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn say_hello_bidi_stream(
        &self,
        req: Request<Streaming<SayHelloRequest>>,
    ) -> core::result::Result<Response<Self::SayHelloBidiStreamStream>, Status> {
        increment_requests(bidi::METHOD);
        Ok(Response::new(self.bidi_stream(req.into_inner())?))
    }
}
