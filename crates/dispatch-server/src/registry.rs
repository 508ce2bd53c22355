//! DispatchRegistry: process-wide state shared by every connection.
//!
//! Three concurrent maps and one counter. Every public method is a single
//! atomic step on one map; callers never see a lock and never get a
//! reference into a map that outlives the call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dispatch_protocol::RideId;
use dispatch_transport::Session;

/// A driver in the available set.
#[derive(Debug, Clone)]
pub struct DriverEntry {
    pub plate: String,
    pub session: Arc<Session>,
}

/// A ride waiting to be claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ride {
    pub id: RideId,
    /// Derived passenger identity (`Passageiro-<name>`)
    pub passenger: String,
    pub origin: String,
    pub destination: String,
}

/// Registry of available drivers, pending rides and waiting passengers.
///
/// A ride id is claimed by at most one caller: [`claim_ride`] is a single
/// `remove` on the pending map.
///
/// [`claim_ride`]: DispatchRegistry::claim_ride
#[derive(Debug)]
pub struct DispatchRegistry {
    drivers: DashMap<String, DriverEntry>,
    pending_rides: DashMap<RideId, Ride>,
    waiting_passengers: DashMap<RideId, Arc<Session>>,
    last_ride_id: AtomicU64,
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self {
            drivers: DashMap::new(),
            pending_rides: DashMap::new(),
            waiting_passengers: DashMap::new(),
            last_ride_id: AtomicU64::new(0),
        }
    }

    // ── Drivers ───────────────────────────────────────────────────────────

    /// Add or replace a driver. Returns the replaced entry, if any; its
    /// session is left open.
    pub fn register_driver(
        &self,
        name: &str,
        plate: &str,
        session: Arc<Session>,
    ) -> Option<DriverEntry> {
        self.drivers.insert(
            name.to_string(),
            DriverEntry {
                plate: plate.to_string(),
                session,
            },
        )
    }

    /// Remove a driver by name. True iff it was present.
    pub fn remove_driver(&self, name: &str) -> bool {
        self.drivers.remove(name).is_some()
    }

    /// Remove a driver only if the entry still belongs to `session_id`.
    pub fn remove_driver_session(&self, name: &str, session_id: &str) -> bool {
        self.drivers
            .remove_if(name, |_, entry| entry.session.id() == session_id)
            .is_some()
    }

    pub fn is_driver_available(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Point-in-time copy of the available set, safe to iterate while other
    /// connections mutate the registry.
    pub fn list_available_drivers(&self) -> Vec<(String, Arc<Session>)> {
        self.drivers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().session.clone()))
            .collect()
    }

    /// Sorted driver names, for logging.
    pub fn available_driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn available_driver_count(&self) -> usize {
        self.drivers.len()
    }

    // ── Rides ─────────────────────────────────────────────────────────────

    /// Fresh ride id, strictly greater than every id returned before.
    /// The first id is 1.
    pub fn next_ride_id(&self) -> RideId {
        self.last_ride_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Add a ride if its id is not already pending.
    pub fn add_pending_ride(&self, ride: Ride) -> bool {
        match self.pending_rides.entry(ride.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ride);
                true
            }
        }
    }

    /// Atomically remove and return a pending ride. Of any number of racing
    /// callers for the same id, exactly one gets `Some`.
    pub fn claim_ride(&self, id: RideId) -> Option<Ride> {
        self.pending_rides.remove(&id).map(|(_, ride)| ride)
    }

    pub fn is_ride_pending(&self, id: RideId) -> bool {
        self.pending_rides.contains_key(&id)
    }

    pub fn pending_ride_count(&self) -> usize {
        self.pending_rides.len()
    }

    // ── Waiting passengers ────────────────────────────────────────────────

    pub fn add_waiting_passenger(&self, id: RideId, session: Arc<Session>) {
        self.waiting_passengers.insert(id, session);
    }

    pub fn remove_waiting_passenger(&self, id: RideId) -> Option<Arc<Session>> {
        self.waiting_passengers.remove(&id).map(|(_, session)| session)
    }

    pub fn waiting_passenger_count(&self) -> usize {
        self.waiting_passengers.len()
    }
}
