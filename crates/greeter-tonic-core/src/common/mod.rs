//! Shared protocol, error, and greeting definitions for the greeter service.
//!
//! ## Submodules
//!
//! - [`error`] - Centralized service error type and its `tonic::Status`
//!   mapping.
//! - [`greeting`] - Locale-aware greeting templates.
//! - [`types`] - Identity key derivation and record construction.
//! - [`proto`] - Generated Protobuf messages and service traits.

pub mod error;
pub mod greeting;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/greeter.proto`.
///
/// ## Services
///
/// - `UserService` - create, list, get, and delete stored users.
/// - `GreeterService` - greet stored users via unary, client-streaming,
///   server-streaming, and bidirectional-streaming calls.
///
/// [`FILE_DESCRIPTOR_SET`](proto::FILE_DESCRIPTOR_SET) is the encoded schema
/// consumed by server reflection.
pub mod proto {
    tonic::include_proto!("greeter");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("greeter_descriptor");
}
