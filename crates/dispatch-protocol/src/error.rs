//! Errors produced while parsing a client line.

use thiserror::Error;

/// Why a client line could not be turned into a [`ClientMessage`].
///
/// Every variant is recoverable: the connection stays open and the line is
/// dropped (or answered with a generic error when the server is configured
/// to reject unknown commands).
///
/// [`ClientMessage`]: crate::ClientMessage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown command {command} for role {role}")]
    UnknownCommand { role: String, command: String },

    #[error("{command} is missing field `{field}`")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("invalid ride id: {0:?}")]
    InvalidRideId(String),
}
