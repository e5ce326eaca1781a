#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use greeter_tonic_core::proto::{
    FILE_DESCRIPTOR_SET, greeter_service_server::GreeterServiceServer,
    user_service_server::UserServiceServer,
};
use server::config::{CliArgs, ServerConfig};
use server::diagnostics::{self, DiagState};
use server::service::{greeter::GreetingService, users::RecordService};
use server::store::RecordStore;
use server::streaming::lifecycle::StreamTracker;
use server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Handles shared by every service and by the shutdown sequence.
#[derive(Clone)]
struct AppState {
    config: ServerConfig,
    store: RecordStore,
    tracker: StreamTracker,
    diag_shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let state = AppState {
        store: RecordStore::new(),
        tracker: StreamTracker::new(config.shutdown_timeout),
        diag_shutdown: CancellationToken::new(),
        config,
    };

    if let Some(diag_addr) = state.config.diag_addr.as_deref() {
        let listener = TcpListener::bind(diag_addr).await?;
        #[cfg(feature = "tracing")]
        tracing::info!("Diagnostics listening on http://{}", diag_addr);
        let diag_state = DiagState {
            store: state.store.clone(),
            tracker: state.tracker.clone(),
        };
        let token = state.diag_shutdown.clone();
        tokio::spawn(async move {
            if let Err(_e) = diagnostics::serve(listener, diag_state, token).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Diagnostics endpoint failed: {:?}", _e);
            }
        });
    }

    if state.config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = state.config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &state.config);
            let res = run_server_with_incoming(providers, incoming, state).await;
            // TODO: Best effort to clean up the socket file although a panic
            // might leave it behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = state.config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &state.config);
        run_server_with_incoming(providers, incoming, state).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    incoming: I,
    state: AppState,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserServiceServer<RecordService>>()
        .await;
    health_reporter
        .set_serving::<GreeterServiceServer<GreetingService>>()
        .await;

    let users = RecordService::new(state.store.clone());
    let greeter = GreetingService::new(
        state.config.clone(),
        state.store.clone(),
        state.tracker.clone(),
    );

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_user_service(users))
        .add_service(build_greeter_service(greeter))
        .serve_with_incoming_shutdown(incoming, shutdown_signal(state, health_reporter, providers))
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting greeter service on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting greeter service on {} (server stream: up to {} messages every {:?})",
            _addr,
            _config.max_greet_count,
            _config.greet_interval
        );
    }
}

fn build_user_service(service: RecordService) -> UserServiceServer<RecordService> {
    UserServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_greeter_service(service: GreetingService) -> GreeterServiceServer<GreetingService> {
    GreeterServiceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    state: AppState,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<UserServiceServer<RecordService>>()
        .await;
    health_reporter
        .set_not_serving::<GreeterServiceServer<GreetingService>>()
        .await;

    // 2. Drain, then cancel, in-flight streams
    state.tracker.shutdown().await;

    // 3. Stop the diagnostics endpoint
    state.diag_shutdown.cancel();

    // 4. Flush telemetry
    providers.shutdown();
}
