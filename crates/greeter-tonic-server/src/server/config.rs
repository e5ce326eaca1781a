use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Upper bound accepted for `--max-greet-count`.
pub const MAX_GREET_COUNT_LIMIT: usize = 100;

/// Runtime configuration for the `greeter-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a local demo.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "greeter-tonic-server",
    version,
    about = "A gRPC service for user records and unary/streaming greetings"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/greeter.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a
    /// file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Capacity of the outbound message buffer of each streaming response.
    ///
    /// When the buffer is full the producing task waits for the client to
    /// consume more messages.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Delay, in milliseconds, between consecutive messages of a
    /// `SayHelloServerStream` response. Zero disables pacing.
    ///
    /// Environment variable: `GREET_INTERVAL_MS`
    #[arg(long, env = "GREET_INTERVAL_MS", default_value_t = 1000)]
    pub greet_interval_ms: u64,

    /// Upper bound (inclusive) of the random number of messages sent by
    /// `SayHelloServerStream`. The lower bound is always one.
    ///
    /// Environment variable: `MAX_GREET_COUNT`
    #[arg(long, env = "MAX_GREET_COUNT", default_value_t = 5)]
    pub max_greet_count: usize,

    /// Seconds to wait for in-flight streams to finish during shutdown before
    /// they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Address of the diagnostic HTTP endpoint (`/healthz`, `/debug/stats`).
    ///
    /// Environment variable: `DIAG_ADDR`
    #[arg(long, env = "DIAG_ADDR", default_value_t = String::from("127.0.0.1:6060"))]
    pub diag_addr: String,

    /// Do not start the diagnostic HTTP endpoint.
    #[arg(long, default_value_t = false)]
    pub no_diag: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub stream_buffer_size: usize,
    pub greet_interval: Duration,
    pub max_greet_count: usize,
    pub shutdown_timeout: Duration,
    pub diag_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            stream_buffer_size: 8,
            greet_interval: Duration::from_secs(1),
            max_greet_count: 5,
            shutdown_timeout: Duration::from_secs(3),
            diag_addr: Some(String::from("127.0.0.1:6060")),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.max_greet_count == 0 {
            bail!("MAX_GREET_COUNT must be greater than 0");
        }

        if args.max_greet_count > MAX_GREET_COUNT_LIMIT {
            bail!(
                "MAX_GREET_COUNT ({}) exceeds the allowed maximum ({})",
                args.max_greet_count,
                MAX_GREET_COUNT_LIMIT
            );
        }

        if args.uds && cfg!(not(unix)) {
            bail!("Unix domain sockets are not supported on this platform");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            stream_buffer_size: args.stream_buffer_size,
            greet_interval: Duration::from_millis(args.greet_interval_ms),
            max_greet_count: args.max_greet_count,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            diag_addr: (!args.no_diag).then_some(args.diag_addr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(core::iter::once("greeter-tonic-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::try_from(parse(&[])).unwrap();
        assert_eq!(config.stream_buffer_size, 8);
        assert_eq!(config.greet_interval, Duration::from_secs(1));
        assert_eq!(config.max_greet_count, 5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(config.diag_addr.as_deref(), Some("127.0.0.1:6060"));
        assert!(!config.uds);
    }

    #[test]
    fn no_diag_disables_endpoint() {
        let config = ServerConfig::try_from(parse(&["--no-diag"])).unwrap();
        assert!(config.diag_addr.is_none());
    }

    #[test]
    fn zero_interval_disables_pacing() {
        let config = ServerConfig::try_from(parse(&["--greet-interval-ms", "0"])).unwrap();
        assert!(config.greet_interval.is_zero());
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = ServerConfig::try_from(parse(&["--stream-buffer-size", "0"])).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }

    #[test]
    fn rejects_out_of_range_greet_count() {
        assert!(ServerConfig::try_from(parse(&["--max-greet-count", "0"])).is_err());
        assert!(ServerConfig::try_from(parse(&["--max-greet-count", "101"])).is_err());
        assert!(ServerConfig::try_from(parse(&["--max-greet-count", "100"])).is_ok());
    }
}
