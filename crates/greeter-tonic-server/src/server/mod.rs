//! Server-side components of the greeter service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`diagnostics`] - HTTP endpoint exposing liveness and runtime stats.
//! - [`service`] - gRPC service implementations.
//! - [`store`] - the shared, volatile record store.
//! - [`streaming`] - streaming call shapes and their lifecycle tracking.
//! - [`telemetry`] - logging, tracing, and metrics initialization.

pub mod config;
pub mod diagnostics;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
