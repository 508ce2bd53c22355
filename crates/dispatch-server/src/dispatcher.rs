//! Per-connection dispatcher: the protocol state machine.
//!
//! One [`Dispatcher`] per connection. It parses each line, mutates the
//! shared [`DispatchRegistry`] through its atomic operations, answers on its
//! own session and notifies other sessions it resolved from the registry.
//!
//! Cleanup runs exactly once: [`LineDispatch::close`] moves the state to
//! `Closed`, and `Drop` repeats the registry part of it if the task died
//! before `close` could run.

use std::sync::Arc;

use dispatch_protocol::{ClientMessage, RideId, Roles, ServerMessage};
use dispatch_transport::{LineDispatch, Session, SessionError};
use tracing::{debug, error, info, warn};

use crate::broadcast::broadcast_to_drivers;
use crate::config::DispatchConfig;
use crate::error::Rejection;
use crate::registry::{DispatchRegistry, Ride};
use crate::state::{ConnectionState, DriverIdentity};

pub struct Dispatcher {
    registry: Arc<DispatchRegistry>,
    session: Arc<Session>,
    config: Arc<DispatchConfig>,
    state: ConnectionState,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<DispatchRegistry>,
        session: Arc<Session>,
        config: Arc<DispatchConfig>,
    ) -> Self {
        Self {
            registry,
            session,
            config,
            state: ConnectionState::Anonymous,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    async fn reply(&self, message: ServerMessage) -> Result<(), SessionError> {
        self.session.send(&message).await
    }

    async fn reject(&self, rejection: Rejection) -> Result<(), SessionError> {
        debug!(
            "Rejected request from {} ({}): {rejection}",
            self.session.id(),
            self.state.label()
        );
        self.reply(rejection.to_message()).await
    }

    // ── Driver commands ───────────────────────────────────────────────────

    async fn driver_online(
        &mut self,
        name: String,
        plate: Option<String>,
    ) -> Result<(), SessionError> {
        match &self.state {
            ConnectionState::DriverBusy { driver, .. } => {
                let rejection = Rejection::AlreadyOnRide {
                    driver: driver.name.clone(),
                };
                return self.reject(rejection).await;
            }
            ConnectionState::PassengerWaiting { .. } => {
                let rejection = Rejection::RoleConflict {
                    role: Roles::PASSENGER,
                };
                return self.reject(rejection).await;
            }
            ConnectionState::DriverAvailable { driver } if driver.name != name => {
                // Renamed: drop the old name so it stops receiving offers.
                self.registry
                    .remove_driver_session(&driver.name, self.session.id());
            }
            ConnectionState::Closed => return Err(SessionError::Closed),
            _ => {}
        }

        let plate = plate.unwrap_or_else(|| self.config.default_plate.clone());
        if let Some(previous) = self
            .registry
            .register_driver(&name, &plate, self.session.clone())
        {
            if previous.session.id() != self.session.id() {
                warn!(
                    "Driver '{name}' registered again from {}; replacing session {}",
                    self.session.peer(),
                    previous.session.id()
                );
            }
        }

        self.state = ConnectionState::DriverAvailable {
            driver: DriverIdentity { name, plate },
        };

        info!(
            "Driver '{}' is online (available: {})",
            self.driver_name(),
            self.registry.available_driver_count()
        );
        debug!("Available drivers: {:?}", self.registry.available_driver_names());

        self.reply(ServerMessage::ok("Você está online")).await
    }

    /// `ride_id` is `None` when the client sent an integer no ride can have.
    async fn driver_accept(&mut self, ride_id: Option<RideId>) -> Result<(), SessionError> {
        let driver = match &self.state {
            ConnectionState::DriverAvailable { driver } => driver.clone(),
            ConnectionState::DriverBusy { driver, .. } => {
                let rejection = Rejection::AlreadyOnRide {
                    driver: driver.name.clone(),
                };
                return self.reject(rejection).await;
            }
            ConnectionState::Anonymous | ConnectionState::PassengerWaiting { .. } => {
                return self.reject(Rejection::NotOnline).await;
            }
            ConnectionState::Closed => return Err(SessionError::Closed),
        };

        let Some(ride) = ride_id.and_then(|id| self.registry.claim_ride(id)) else {
            debug!("Driver '{}' could not claim ride {ride_id:?}", driver.name);
            return self.reject(Rejection::RideUnavailable).await;
        };
        let ride_id = ride.id;

        self.registry
            .remove_driver_session(&driver.name, self.session.id());
        self.state = ConnectionState::DriverBusy {
            driver: driver.clone(),
            ride_id,
        };

        info!(
            "Driver '{}' accepted ride {ride_id} for {} ({} -> {})",
            driver.name, ride.passenger, ride.origin, ride.destination
        );

        match self.registry.remove_waiting_passenger(ride_id) {
            Some(passenger) => {
                let notice = ServerMessage::RideAccepted {
                    ride_id,
                    driver: driver.name.clone(),
                    plate: driver.plate.clone(),
                };
                if let Err(e) = passenger.send(&notice).await {
                    warn!("Failed to notify {} of ride {ride_id}: {e}", ride.passenger);
                }
            }
            None => debug!("Ride {ride_id} has no waiting passenger session"),
        }

        let result = self
            .reply(ServerMessage::ok(format!("Você aceitou a corrida {ride_id}")))
            .await;

        if self.config.announce_withdrawals {
            broadcast_to_drivers(
                &self.registry,
                &ServerMessage::RideWithdrawn { ride_id },
                Some(self.session.id()),
            )
            .await;
        }

        result
    }

    async fn driver_finish(&mut self) -> Result<(), SessionError> {
        let (driver, ride_id) = match &self.state {
            ConnectionState::DriverBusy { driver, ride_id } => (driver.clone(), *ride_id),
            ConnectionState::Closed => return Err(SessionError::Closed),
            _ => {
                warn!(
                    "Connection {} ({}) tried to finish a ride without one",
                    self.session.id(),
                    self.state.label()
                );
                return self.reject(Rejection::NotOnRide).await;
            }
        };

        self.registry
            .register_driver(&driver.name, &driver.plate, self.session.clone());
        info!(
            "Driver '{}' finished ride {ride_id} and is available again (available: {})",
            driver.name,
            self.registry.available_driver_count()
        );
        self.state = ConnectionState::DriverAvailable { driver };

        self.reply(ServerMessage::ok(format!(
            "Corrida {ride_id} finalizada. Voce esta disponivel novamente."
        )))
        .await
    }

    // ── Passenger commands ────────────────────────────────────────────────

    async fn passenger_request(
        &mut self,
        name: String,
        origin: String,
        destination: String,
    ) -> Result<(), SessionError> {
        match &self.state {
            ConnectionState::Anonymous => {}
            ConnectionState::PassengerWaiting { ride_id, .. } => {
                let rejection = Rejection::AlreadyWaiting { ride_id: *ride_id };
                return self.reject(rejection).await;
            }
            ConnectionState::DriverAvailable { .. } | ConnectionState::DriverBusy { .. } => {
                let rejection = Rejection::RoleConflict {
                    role: Roles::DRIVER,
                };
                return self.reject(rejection).await;
            }
            ConnectionState::Closed => return Err(SessionError::Closed),
        }

        let ride_id = self.registry.next_ride_id();
        let ride = Ride {
            id: ride_id,
            passenger: format!("Passageiro-{name}"),
            origin,
            destination,
        };

        // Waiting session first: once the ride is pending it can be claimed,
        // and the claimer looks the passenger up immediately.
        self.registry
            .add_waiting_passenger(ride_id, self.session.clone());
        if !self.registry.add_pending_ride(ride.clone()) {
            error!("Ride id {ride_id} was already pending");
        }
        self.state = ConnectionState::PassengerWaiting {
            passenger: ride.passenger.clone(),
            ride_id,
        };

        info!(
            "{} requested ride {ride_id} ({} -> {})",
            ride.passenger, ride.origin, ride.destination
        );

        self.reply(ServerMessage::ok(format!(
            "Procurando motorista para sua corrida {ride_id}"
        )))
        .await?;

        let offer = ServerMessage::NewRide {
            ride_id,
            origin: ride.origin,
            destination: ride.destination,
        };
        let report = broadcast_to_drivers(&self.registry, &offer, None).await;
        info!(
            "Ride {ride_id} offered to {} driver(s), {} failed",
            report.delivered, report.failed
        );
        Ok(())
    }

    // ── Cleanup ───────────────────────────────────────────────────────────

    /// Release everything this connection holds in the registry. Returns the
    /// pending ride this released, if any. A second call is a no-op.
    fn release(&mut self) -> Option<Ride> {
        let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

        if let Some(driver) = state.driver() {
            if self
                .registry
                .remove_driver_session(&driver.name, self.session.id())
            {
                info!(
                    "Available driver '{}' disconnected (available: {})",
                    driver.name,
                    self.registry.available_driver_count()
                );
                debug!("Remaining drivers: {:?}", self.registry.available_driver_names());
            }
        }

        // Withdraw the ride before dropping the passenger session so a driver
        // cannot win a ride whose passenger is already gone.
        let ride_id = state.ride_id()?;
        let cancelled = self.registry.claim_ride(ride_id);
        self.registry.remove_waiting_passenger(ride_id);
        if let Some(ref ride) = cancelled {
            info!(
                "Pending ride {ride_id} ({}) cancelled after disconnect",
                ride.passenger
            );
        }
        cancelled
    }

    fn driver_name(&self) -> &str {
        self.state.driver().map(|d| d.name.as_str()).unwrap_or_default()
    }
}

impl LineDispatch for Dispatcher {
    async fn handle_line(&mut self, line: &str) -> Result<(), SessionError> {
        if self.state.is_closed() {
            return Err(SessionError::Closed);
        }

        let message = match ClientMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring line from {}: {e}", self.session.id());
                if self.config.reject_unknown {
                    return self.reply(Rejection::InvalidCommand.to_message()).await;
                }
                return Ok(());
            }
        };

        debug!(
            "[{}] {} {} ({})",
            self.session.id(),
            message.role(),
            message.command(),
            self.state.label()
        );

        match message {
            ClientMessage::DriverOnline { name, plate } => self.driver_online(name, plate).await,
            ClientMessage::DriverAccept { ride_id } => self.driver_accept(ride_id).await,
            ClientMessage::DriverFinish { .. } => self.driver_finish().await,
            ClientMessage::PassengerRequest {
                name,
                origin,
                destination,
            } => self.passenger_request(name, origin, destination).await,
        }
    }

    async fn close(mut self) {
        let was = self.state.label();
        let cancelled = self.release();

        if let Some(ride) = cancelled {
            if self.config.announce_withdrawals {
                broadcast_to_drivers(
                    &self.registry,
                    &ServerMessage::RideWithdrawn { ride_id: ride.id },
                    None,
                )
                .await;
            }
        }

        debug!("Cleanup finished for {} (was {was})", self.session.id());
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.state.is_closed() {
            warn!(
                "Dispatcher for {} dropped without close; releasing registry entries",
                self.session.id()
            );
            self.release();
        }
    }
}
