//! Error types for the greeter service.
//!
//! This module defines the central `Error` enum shared by the record store,
//! the user service, and every greeting call shape. It implements
//! `From<Error>` for `tonic::Status` so handlers can surface failures with
//! `?` and the right gRPC status code.
//!
//! ## Error Cases
//! - `NotFound`: A lookup by identity key missed. This is the only domain
//!   error; it always terminates the current call.
//! - `RequestCancelled`: The client went away mid-call.
//! - `ServiceShutdown`: The call was refused or interrupted because the
//!   service is shutting down.
//! - `Transport`: The inbound request stream yielded a transport error.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the greeter service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// No user is stored under `key`.
    #[error("no such user: {key}")]
    NotFound { key: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The inbound request stream failed.
    #[error("Transport error: {}", .0.message())]
    Transport(Status),
}

impl Error {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Transport(status)
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { key } => Status::not_found(format!("no such user: {key}")),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
            Error::Transport(status) => status,
        }
    }
}
