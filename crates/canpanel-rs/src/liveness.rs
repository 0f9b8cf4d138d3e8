//! Heartbeat accounting and self node-ID bootstrap.
//!
//! Every tick, while the panel is armed, each active peer's missed-tick
//! counter grows by one and a counter reaching the timeout raises the alarm.
//! Received heartbeats reset a peer's counter. The local entry is held at
//! zero so a node never times itself out.
//!
//! A node without an id listens for `bootstrap_ticks` ticks while disarmed
//! and then claims the lowest id no heartbeat has been seen for.

use crate::alarm::AlarmController;
use crate::config::PanelConfig;
use crate::log::{PanelLogContext, my_debug, my_info, my_warn};
use crate::message::PanelMessage;
use crate::node::NodeAction;
use crate::store::SharedState;
use crate::types::{BOOTSTRAP_TICKS, Indicator, LIVENESS_TIMEOUT_TICKS, MAX_NODES, NodeId};
use alloc::vec;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatEntry {
    /// A heartbeat from this id has been seen (or the id is our own).
    pub active: bool,
    pub missed_ticks: u16,
}

/// Per-node heartbeat state, indexed by `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatTable {
    entries: [HeartbeatEntry; MAX_NODES],
}

impl Default for HeartbeatTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatTable {
    pub const fn new() -> Self {
        Self {
            entries: [HeartbeatEntry { active: false, missed_ticks: 0 }; MAX_NODES],
        }
    }

    pub fn entry(&self, id: NodeId) -> HeartbeatEntry {
        self.entries[id.index()]
    }

    /// Marks `id` active and restarts its timeout window.
    pub fn record(&mut self, id: NodeId) {
        self.entries[id.index()] = HeartbeatEntry { active: true, missed_ticks: 0 };
    }

    pub fn clear_missed(&mut self, id: NodeId) {
        self.entries[id.index()].missed_ticks = 0;
    }

    /// Zeroes every counter. Active flags are kept.
    pub fn reset_counters(&mut self) {
        for entry in &mut self.entries {
            entry.missed_ticks = 0;
        }
    }

    /// One liveness tick. Returns the peers at or past `timeout` ticks.
    pub fn advance(&mut self, own: Option<NodeId>, timeout: u16) -> heapless::Vec<NodeId, MAX_NODES> {
        let mut expired = heapless::Vec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let id = NodeId(index as u8);
            if Some(id) == own {
                entry.missed_ticks = 0;
                continue;
            }
            if !entry.active {
                continue;
            }
            entry.missed_ticks = entry.missed_ticks.saturating_add(1);
            if entry.missed_ticks >= timeout {
                // Capacity equals the table size.
                let _ = expired.push(id);
            }
        }
        expired
    }

    pub fn lowest_inactive(&self) -> Option<NodeId> {
        self.entries
            .iter()
            .position(|entry| !entry.active)
            .map(|index| NodeId(index as u8))
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.active).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, HeartbeatEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (NodeId(index as u8), *entry))
    }
}

/// Tick-driven half of the heartbeat protocol. Owned by the tick task.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    timeout_ticks: u16,
    bootstrap_ticks: u16,
    bootstrap_counter: u16,
    alarm: AlarmController,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(LIVENESS_TIMEOUT_TICKS, BOOTSTRAP_TICKS, AlarmController::default())
    }
}

impl LivenessTracker {
    pub fn new(timeout_ticks: u16, bootstrap_ticks: u16, alarm: AlarmController) -> Self {
        Self {
            timeout_ticks,
            bootstrap_ticks,
            bootstrap_counter: 0,
            alarm,
        }
    }

    pub fn from_config(config: &PanelConfig) -> Self {
        Self::new(
            config.liveness_timeout_ticks,
            config.bootstrap_ticks,
            AlarmController::new(config.intrusion_countdown_ms),
        )
    }

    pub fn bootstrap_counter(&self) -> u16 {
        self.bootstrap_counter
    }

    /// The periodic liveness tick.
    pub fn on_tick<M: RawMutex>(&mut self, state: &SharedState<M>) -> Vec<NodeAction> {
        let own = state.self_id();
        if state.is_locked() {
            let expired = state.with_heartbeats(|table| table.advance(own, self.timeout_ticks));
            if let Some(first) = expired.first() {
                let actions = self.alarm.raise_alarm(state);
                if !actions.is_empty() {
                    my_warn!(
                        PanelLogContext::new("liveness", own),
                        "Node {} silent for {} ticks ({} node(s) lost).",
                        first,
                        self.timeout_ticks,
                        expired.len()
                    );
                }
                return actions;
            }
            return Vec::new();
        }

        match own {
            Some(id) => {
                state.with_heartbeats(|table| table.clear_missed(id));
                Vec::new()
            }
            None => self.bootstrap(state),
        }
    }

    fn bootstrap<M: RawMutex>(&mut self, state: &SharedState<M>) -> Vec<NodeAction> {
        self.bootstrap_counter = self.bootstrap_counter.saturating_add(1);
        if self.bootstrap_counter < self.bootstrap_ticks {
            return Vec::new();
        }
        self.bootstrap_counter = 0;

        let claimed = state.with_heartbeats(|table| {
            let id = table.lowest_inactive()?;
            table.record(id);
            Some(id)
        });
        match claimed {
            Some(id) => {
                state.set_self_id(id);
                my_info!(PanelLogContext::new("liveness", Some(id)), "Claimed node id {}.", id);
            }
            None => my_warn!(
                PanelLogContext::new("liveness", None),
                "All {} node ids are in use, still listening.",
                MAX_NODES
            ),
        }
        Vec::new()
    }

    /// The periodic heartbeat broadcast.
    pub fn on_heartbeat_timer<M: RawMutex>(&self, state: &SharedState<M>) -> Vec<NodeAction> {
        let toggle = NodeAction::ToggleIndicator(Indicator::Heartbeat);
        match state.self_id() {
            Some(id) => {
                state.with_heartbeats(|table| table.clear_missed(id));
                vec![NodeAction::Broadcast(PanelMessage::Heartbeat { node: id.0 }), toggle]
            }
            None => {
                my_debug!(PanelLogContext::new("liveness", None), "No node id yet, heartbeat skipped.");
                vec![toggle]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PASSWORD;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn alarm_broadcasts(actions: &[NodeAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, NodeAction::Broadcast(PanelMessage::AlarmStarted { .. })))
            .count()
    }

    #[test]
    fn silent_peer_raises_alarm_once_at_the_timeout_tick() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(0));
        state.with_heartbeats(|t| {
            t.record(NodeId(0));
            t.record(NodeId(3));
        });
        state.set_locked(true);
        let mut tracker = LivenessTracker::default();

        let mut raised_at = Vec::new();
        for tick in 1..=60u16 {
            if alarm_broadcasts(&tracker.on_tick(&state)) > 0 {
                raised_at.push(tick);
            }
        }
        assert_eq!(raised_at, vec![LIVENESS_TIMEOUT_TICKS]);
        assert!(state.is_alarm_active());
        assert_eq!(state.heartbeats().entry(NodeId(0)).missed_ticks, 0);
    }

    #[test]
    fn heartbeat_restarts_the_window() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(1));
        state.with_heartbeats(|t| t.record(NodeId(2)));
        state.set_locked(true);
        let mut tracker = LivenessTracker::default();

        for _ in 0..49 {
            tracker.on_tick(&state);
        }
        state.with_heartbeats(|t| t.record(NodeId(2)));
        for _ in 0..49 {
            assert!(tracker.on_tick(&state).is_empty());
        }
        assert!(!state.is_alarm_active());
    }

    #[test]
    fn counters_hold_while_disarmed() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(1));
        state.with_heartbeats(|t| t.record(NodeId(2)));
        let mut tracker = LivenessTracker::default();
        for _ in 0..100 {
            tracker.on_tick(&state);
        }
        assert_eq!(state.heartbeats().entry(NodeId(2)).missed_ticks, 0);
        assert!(!state.is_alarm_active());
    }

    #[test]
    fn bootstrap_claims_the_lowest_free_id_after_the_grace_period() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.with_heartbeats(|t| {
            t.record(NodeId(0));
            t.record(NodeId(1));
            t.record(NodeId(3));
        });
        let mut tracker = LivenessTracker::default();

        for _ in 0..BOOTSTRAP_TICKS - 1 {
            tracker.on_tick(&state);
        }
        assert_eq!(state.self_id(), None);
        tracker.on_tick(&state);
        assert_eq!(state.self_id(), Some(NodeId(2)));
        assert!(state.heartbeats().entry(NodeId(2)).active);
        assert_eq!(tracker.bootstrap_counter(), 0);

        for _ in 0..BOOTSTRAP_TICKS * 2 {
            tracker.on_tick(&state);
        }
        assert_eq!(state.self_id(), Some(NodeId(2)));
    }

    #[test]
    fn bootstrap_waits_while_armed() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_locked(true);
        let mut tracker = LivenessTracker::default();
        for _ in 0..BOOTSTRAP_TICKS * 2 {
            tracker.on_tick(&state);
        }
        assert_eq!(state.self_id(), None);
    }

    #[test]
    fn full_bus_leaves_the_node_unassigned() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.with_heartbeats(|t| {
            for id in 0..MAX_NODES as u8 {
                t.record(NodeId(id));
            }
        });
        let mut tracker = LivenessTracker::default();
        for _ in 0..BOOTSTRAP_TICKS {
            tracker.on_tick(&state);
        }
        assert_eq!(state.self_id(), None);
        assert_eq!(tracker.bootstrap_counter(), 0);
    }

    #[test]
    fn heartbeat_broadcast_carries_own_id_and_zeroes_own_counter() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        let tracker = LivenessTracker::default();
        assert_eq!(
            tracker.on_heartbeat_timer(&state),
            vec![NodeAction::ToggleIndicator(Indicator::Heartbeat)]
        );

        state.set_self_id(NodeId(6));
        let actions = tracker.on_heartbeat_timer(&state);
        assert_eq!(actions[0], NodeAction::Broadcast(PanelMessage::Heartbeat { node: 6 }));
        assert_eq!(state.heartbeats().entry(NodeId(6)).missed_ticks, 0);
    }
}
