//! gRPC service implementations.
//!
//! Both services share one [`RecordStore`](crate::server::store::RecordStore)
//! handle, constructed once in `main` and injected here.
//!
//! ## Structure
//!
//! - [`users`] - `UserService` (`RecordService`): create, list, get, delete.
//! - [`greeter`] - `GreeterService` (`GreetingService`): unary and streaming
//!   greetings.

pub mod greeter;
pub mod users;
