//! Defines the data structures sent to the diagnostic monitor.
//!
//! Snapshots are taken on the panel side, passed to the monitor thread and
//! serialized to JSON for the web frontend. The password is never part of a
//! snapshot.

use canpanel_rs::{AlarmState, SharedState};
use embassy_sync::blocking_mutex::raw::RawMutex;
use serde::Serialize;

/// Heartbeat bookkeeping for one node id.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub node_id: u8,
    pub active: bool,
    pub missed_ticks: u16,
}

/// The data packet sent from a panel to the monitor.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PanelSnapshot {
    /// The claimed node id, `None` while bootstrapping.
    pub node_id: Option<u8>,
    /// Derived alarm state name (`Disarmed`, `Armed`, ...).
    pub alarm_state: String,
    pub locked: bool,
    pub alarm_active: bool,
    pub intrusion_timer_active: bool,
    pub password_change_in_progress: bool,
    /// One entry per node id, including inactive ones.
    pub peers: Vec<PeerInfo>,
}

impl PanelSnapshot {
    /// Reads every field through the store accessors, one lock at a time.
    pub fn capture<M: RawMutex>(state: &SharedState<M>) -> Self {
        Self {
            node_id: state.self_id().map(u8::from),
            alarm_state: format!("{:?}", AlarmState::from_store(state)),
            locked: state.is_locked(),
            alarm_active: state.is_alarm_active(),
            intrusion_timer_active: state.is_intrusion_timer_active(),
            password_change_in_progress: state.is_password_change_in_progress(),
            peers: state
                .heartbeats()
                .iter()
                .map(|(id, entry)| PeerInfo {
                    node_id: id.into(),
                    active: entry.active,
                    missed_ticks: entry.missed_ticks,
                })
                .collect(),
        }
    }
}
