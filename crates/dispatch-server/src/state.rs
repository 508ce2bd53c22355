//! Per-connection protocol state.

use dispatch_protocol::RideId;

/// Identity a driver connection registered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverIdentity {
    pub name: String,
    pub plate: String,
}

/// What a single connection currently is, from the server's point of view.
///
/// ```text
/// Anonymous ──ONLINE──▶ DriverAvailable ◀──FINALIZAR── DriverBusy
///     │                       └──────────ACEITAR──────────▲
///     └──PEDIR──▶ PassengerWaiting
/// any ──disconnect──▶ Closed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Anonymous,
    DriverAvailable {
        driver: DriverIdentity,
    },
    DriverBusy {
        driver: DriverIdentity,
        ride_id: RideId,
    },
    /// Stays here after the ride is claimed; the passenger has no further
    /// protocol role.
    PassengerWaiting {
        passenger: String,
        ride_id: RideId,
    },
    Closed,
}

impl ConnectionState {
    /// Driver identity, whether available or busy.
    pub fn driver(&self) -> Option<&DriverIdentity> {
        match self {
            Self::DriverAvailable { driver } | Self::DriverBusy { driver, .. } => Some(driver),
            _ => None,
        }
    }

    /// Ride tracked locally by this connection, if any.
    pub fn ride_id(&self) -> Option<RideId> {
        match self {
            Self::DriverBusy { ride_id, .. } | Self::PassengerWaiting { ride_id, .. } => {
                Some(*ride_id)
            }
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::DriverAvailable { .. } => "driver-available",
            Self::DriverBusy { .. } => "driver-busy",
            Self::PassengerWaiting { .. } => "passenger-waiting",
            Self::Closed => "closed",
        }
    }
}
