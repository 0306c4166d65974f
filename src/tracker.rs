//! Bidirectional notification tracker.
//!
//! Correlates the protocol layer's process-scoped bus ids with the stable
//! correlation ids used by collaborating subsystems, and records each entry's
//! display status. Both directions live under one lock and are always kept
//! symmetric.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Local};

use crate::notification::CloseReason;

/// Display lifecycle state machine.
///
/// `Pending` and `Active` are the only non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayStatus {
    Pending,
    Active,
    Expired,
    Dismissed,
    Closed,
}

impl DisplayStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DisplayStatus::Pending | DisplayStatus::Active)
    }
}

impl From<CloseReason> for DisplayStatus {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Expired => DisplayStatus::Expired,
            CloseReason::Dismissed => DisplayStatus::Dismissed,
            CloseReason::Closed | CloseReason::Undefined => DisplayStatus::Closed,
        }
    }
}

/// One tracked notification entry.
#[derive(Debug, Clone)]
pub struct TrackedNotification {
    pub correlation_id: String,
    pub bus_id: u32,
    pub status: DisplayStatus,
    pub expires_at: Option<DateTime<Local>>,
    pub registered_at: DateTime<Local>,
    pub closed_at: Option<DateTime<Local>>,
}

#[derive(Default)]
struct Maps {
    by_correlation: HashMap<String, u32>,
    by_bus: HashMap<u32, TrackedNotification>,
}

/// Thread-safe {correlation id <-> bus id} table with per-entry status.
#[derive(Default)]
pub struct NotificationTracker {
    inner: Mutex<Maps>,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mapping. A correlation id already mapped to a different bus
    /// id has its stale reverse mapping released first, and vice versa.
    pub fn register(&self, correlation_id: &str, bus_id: u32, expires_at: Option<DateTime<Local>>) {
        let mut maps = self.inner.lock().unwrap();
        if let Some(stale_bus) = maps.by_correlation.insert(correlation_id.to_string(), bus_id) {
            if stale_bus != bus_id {
                maps.by_bus.remove(&stale_bus);
            }
        }
        if let Some(stale) = maps.by_bus.get(&bus_id) {
            if stale.correlation_id != correlation_id {
                let old = stale.correlation_id.clone();
                maps.by_correlation.remove(&old);
            }
        }
        maps.by_bus.insert(
            bus_id,
            TrackedNotification {
                correlation_id: correlation_id.to_string(),
                bus_id,
                status: DisplayStatus::Pending,
                expires_at,
                registered_at: Local::now(),
                closed_at: None,
            },
        );
    }

    pub fn get_by_correlation_id(&self, correlation_id: &str) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .by_correlation
            .get(correlation_id)
            .copied()
    }

    pub fn get_by_bus_id(&self, bus_id: u32) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .by_bus
            .get(&bus_id)
            .map(|entry| entry.correlation_id.clone())
    }

    /// Records a status transition; entering any terminal status stamps
    /// `closed_at` once. Returns false for unknown ids.
    pub fn set_status(&self, correlation_id: &str, status: DisplayStatus) -> bool {
        let mut maps = self.inner.lock().unwrap();
        let Some(&bus_id) = maps.by_correlation.get(correlation_id) else {
            return false;
        };
        Self::set_status_entry(&mut maps, bus_id, status)
    }

    pub fn set_status_by_bus_id(&self, bus_id: u32, status: DisplayStatus) -> bool {
        let mut maps = self.inner.lock().unwrap();
        Self::set_status_entry(&mut maps, bus_id, status)
    }

    /// Replaces the expected expiry recorded at registration, e.g. after a
    /// stack or hover reset restarted the display duration.
    pub fn set_expiry_by_bus_id(&self, bus_id: u32, expires_at: Option<DateTime<Local>>) -> bool {
        let mut maps = self.inner.lock().unwrap();
        match maps.by_bus.get_mut(&bus_id) {
            Some(entry) => {
                entry.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    fn set_status_entry(maps: &mut Maps, bus_id: u32, status: DisplayStatus) -> bool {
        match maps.by_bus.get_mut(&bus_id) {
            Some(entry) => {
                entry.status = status;
                if status.is_terminal() && entry.closed_at.is_none() {
                    entry.closed_at = Some(Local::now());
                }
                true
            }
            None => false,
        }
    }

    /// Deletes both directions atomically.
    pub fn remove(&self, correlation_id: &str) -> Option<u32> {
        let mut maps = self.inner.lock().unwrap();
        let bus_id = maps.by_correlation.remove(correlation_id)?;
        maps.by_bus.remove(&bus_id);
        Some(bus_id)
    }

    pub fn remove_by_bus_id(&self, bus_id: u32) -> Option<String> {
        let mut maps = self.inner.lock().unwrap();
        let entry = maps.by_bus.remove(&bus_id)?;
        maps.by_correlation.remove(&entry.correlation_id);
        Some(entry.correlation_id)
    }

    /// Snapshot of all entries in a non-terminal status.
    pub fn active_notifications(&self) -> Vec<TrackedNotification> {
        let maps = self.inner.lock().unwrap();
        let mut active: Vec<_> = maps
            .by_bus
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|entry| entry.bus_id);
        active
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().by_bus.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .by_bus
            .values()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }
}
