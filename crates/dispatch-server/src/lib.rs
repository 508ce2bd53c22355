//! Dispatch server: matching drivers with passengers.
//!
//! The server owns the shared [`DispatchRegistry`] and provides the
//! [`ConnectionHandler`](dispatch_transport::ConnectionHandler)
//! implementation for the transport layer. Each connection gets a
//! [`Dispatcher`] that runs the protocol state machine for it.

pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod service;
pub mod state;

pub use broadcast::{BroadcastReport, broadcast_to_drivers};
pub use config::{DEFAULT_PLATE, DispatchConfig};
pub use dispatcher::Dispatcher;
pub use error::Rejection;
pub use registry::{DispatchRegistry, DriverEntry, Ride};
pub use service::DispatchService;
pub use state::{ConnectionState, DriverIdentity};
