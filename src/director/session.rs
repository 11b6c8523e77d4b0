use std::{
    sync::{Mutex, PoisonError, RwLock},
    time::SystemTime,
};

use crate::{
    events::EventLog,
    race::{DriverSnapshot, RacePhase},
};

/// State shared by the detection and direction loops of one directed session.
///
/// The detection loop is the only writer of the driver snapshot, the direction loop the only
/// writer of the race phase. Both use the event log.
pub struct RaceSession {
    drivers: RwLock<DriverSnapshot>,
    phase: RwLock<RacePhase>,
    events: Mutex<EventLog>,
    recording_started_at: SystemTime,
}

impl RaceSession {
    pub fn new(
        drivers: DriverSnapshot,
        events: EventLog,
        recording_started_at: SystemTime,
    ) -> Self {
        Self {
            drivers: RwLock::new(drivers),
            phase: RwLock::new(RacePhase::default()),
            events: Mutex::new(events),
            recording_started_at,
        }
    }

    /// Latest published driver snapshot.
    pub fn drivers(&self) -> DriverSnapshot {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish_drivers(&self, snapshot: DriverSnapshot) {
        *self.drivers.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn phase(&self) -> RacePhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update_phase<R>(&self, update: impl FnOnce(&mut RacePhase) -> R) -> R {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut *phase)
    }

    pub fn with_events<R>(&self, access: impl FnOnce(&mut EventLog) -> R) -> R {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        access(&mut *events)
    }

    pub fn recording_started_at(&self) -> SystemTime {
        self.recording_started_at
    }
}
