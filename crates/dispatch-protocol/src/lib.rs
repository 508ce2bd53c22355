//! Ride dispatch protocol types.
//!
//! One message per line, fields separated by `|`. This crate is the single
//! source of truth for role names, command names, the client grammar and the
//! exact text of every server message.

pub mod commands;
pub mod error;
pub mod message;

pub use commands::{Commands, Roles};
pub use error::ProtocolError;
pub use message::{ClientMessage, RideId, ServerMessage, FIELD_SEPARATOR};
