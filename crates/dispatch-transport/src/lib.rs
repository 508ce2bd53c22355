//! Dispatch transport layer.
//!
//! Plain TCP, one UTF-8 line per message. The transport handles:
//! - Listening and accepting connections (with a connection cap)
//! - One [`Session`] per connection, shared by reference for notifications
//! - The per-connection read loop, handing each line to a [`LineDispatch`]
//! - Running the dispatch's cleanup exactly once when the loop ends
//!
//! The transport is decoupled from dispatch logic via the
//! [`ConnectionHandler`] trait.

pub mod error;
pub mod server;
pub mod session;

pub use error::{SessionError, TransportError};
pub use server::{ConnectionHandler, LineDispatch, TransportConfig, TransportServer, run_session};
pub use session::Session;
