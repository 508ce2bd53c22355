//! Client commands and server messages.

use std::fmt;

use crate::commands::{Commands, Roles};
use crate::error::ProtocolError;

/// Separator between fields on a line.
pub const FIELD_SEPARATOR: char = '|';

/// Ride identifier. Assigned by the server, never reused.
pub type RideId = u64;

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `MOTORISTA|ONLINE|<name>[|<plate>]`
    DriverOnline { name: String, plate: Option<String> },
    /// `MOTORISTA|ACEITAR|<rideId>`. `None` for an integer that can never
    /// be an issued id (negative or out of range).
    DriverAccept { ride_id: Option<RideId> },
    /// `MOTORISTA|FINALIZAR|<rideId>`. The id is informational only.
    DriverFinish { ride_id: Option<RideId> },
    /// `PASSAGEIRO|PEDIR|<name>|<origin>|<destination>`
    PassengerRequest {
        name: String,
        origin: String,
        destination: String,
    },
}

impl ClientMessage {
    /// Parse one line (without its trailing newline; a trailing `\r` is
    /// tolerated). Extra trailing fields are ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut fields = line.split(FIELD_SEPARATOR);
        let role = fields.next().unwrap_or_default();
        let command = fields.next().unwrap_or_default();

        match role {
            Roles::DRIVER => match command {
                Commands::ONLINE => {
                    let name = required(fields.next(), Commands::ONLINE, "name")?;
                    let plate = fields
                        .next()
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string);
                    Ok(Self::DriverOnline { name, plate })
                }
                Commands::ACCEPT => {
                    let raw = required(fields.next(), Commands::ACCEPT, "rideId")?;
                    let value: i128 = raw
                        .trim()
                        .parse()
                        .map_err(|_| ProtocolError::InvalidRideId(raw))?;
                    Ok(Self::DriverAccept {
                        ride_id: RideId::try_from(value).ok(),
                    })
                }
                Commands::FINISH => {
                    let ride_id = fields.next().and_then(|raw| raw.trim().parse().ok());
                    Ok(Self::DriverFinish { ride_id })
                }
                other => Err(unknown_command(role, other)),
            },
            Roles::PASSENGER => match command {
                Commands::REQUEST => {
                    let name = required(fields.next(), Commands::REQUEST, "name")?;
                    let origin = present(fields.next(), Commands::REQUEST, "origin")?;
                    let destination = present(fields.next(), Commands::REQUEST, "destination")?;
                    Ok(Self::PassengerRequest {
                        name,
                        origin,
                        destination,
                    })
                }
                other => Err(unknown_command(role, other)),
            },
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }

    /// Wire role of this message.
    pub fn role(&self) -> &'static str {
        match self {
            Self::DriverOnline { .. } | Self::DriverAccept { .. } | Self::DriverFinish { .. } => {
                Roles::DRIVER
            }
            Self::PassengerRequest { .. } => Roles::PASSENGER,
        }
    }

    /// Wire command of this message.
    pub fn command(&self) -> &'static str {
        match self {
            Self::DriverOnline { .. } => Commands::ONLINE,
            Self::DriverAccept { .. } => Commands::ACCEPT,
            Self::DriverFinish { .. } => Commands::FINISH,
            Self::PassengerRequest { .. } => Commands::REQUEST,
        }
    }
}

/// Field must exist and be non-blank.
fn required(
    field: Option<&str>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ProtocolError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(ProtocolError::MissingField {
            command,
            field: name,
        }),
    }
}

/// Field must exist; free text, may be empty.
fn present(
    field: Option<&str>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ProtocolError> {
    field.map(str::to_string).ok_or(ProtocolError::MissingField {
        command,
        field: name,
    })
}

fn unknown_command(role: &str, command: &str) -> ProtocolError {
    ProtocolError::UnknownCommand {
        role: role.to_string(),
        command: command.to_string(),
    }
}

/// A message the server writes to a client. `Display` yields the exact line
/// (without newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `SERVER|OK|<text>`
    Ok(String),
    /// `SERVER|ERRO|<text>`
    Error(String),
    /// `SERVER|NOVA_CORRIDA|<rideId>|<origin>|<destination>`
    NewRide {
        ride_id: RideId,
        origin: String,
        destination: String,
    },
    /// `SERVER|CORRIDA <id> ACEITA |<driver>|<plate>`
    RideAccepted {
        ride_id: RideId,
        driver: String,
        plate: String,
    },
    /// `SERVER|CORRIDA_REMOVIDA|<rideId>`
    RideWithdrawn { ride_id: RideId },
}

impl ServerMessage {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let server = Roles::SERVER;
        match self {
            Self::Ok(text) => write!(f, "{server}|{}|{text}", Commands::OK),
            Self::Error(text) => write!(f, "{server}|{}|{text}", Commands::ERROR),
            Self::NewRide {
                ride_id,
                origin,
                destination,
            } => write!(
                f,
                "{server}|{}|{ride_id}|{origin}|{destination}",
                Commands::NEW_RIDE
            ),
            Self::RideAccepted {
                ride_id,
                driver,
                plate,
            } => write!(f, "{server}|CORRIDA {ride_id} ACEITA |{driver}|{plate}"),
            Self::RideWithdrawn { ride_id } => {
                write!(f, "{server}|{}|{ride_id}", Commands::RIDE_WITHDRAWN)
            }
        }
    }
}
