//! Intrusion and alarm state machine.
//!
//! The state is not stored separately; it is derived from the flags in the
//! [`SharedState`] so every task sees the same picture.

use crate::log::{PanelLogContext, my_debug, my_info};
use crate::message::PanelMessage;
use crate::node::NodeAction;
use crate::store::SharedState;
use crate::text;
use crate::types::{INTRUSION_COUNTDOWN_MS, Indicator, UNASSIGNED_NODE_ID};
use alloc::vec;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Disarmed,
    Armed,
    /// Armed with the intrusion countdown running.
    IntrusionDetected,
    AlarmRaised,
}

impl AlarmState {
    pub fn from_store<M: RawMutex>(state: &SharedState<M>) -> Self {
        if state.is_alarm_active() {
            AlarmState::AlarmRaised
        } else if !state.is_locked() {
            AlarmState::Disarmed
        } else if state.is_intrusion_timer_active() {
            AlarmState::IntrusionDetected
        } else {
            AlarmState::Armed
        }
    }
}

/// Where a lock transition was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The local keypad. The transition is announced on the bus.
    Local,
    /// A peer's broadcast. Not echoed back.
    Remote,
}

/// Sender byte for outgoing messages.
pub(crate) fn own_node_byte<M: RawMutex>(state: &SharedState<M>) -> u8 {
    state.self_id().map_or(UNASSIGNED_NODE_ID, u8::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmController {
    countdown_ms: u32,
}

impl Default for AlarmController {
    fn default() -> Self {
        Self::new(INTRUSION_COUNTDOWN_MS)
    }
}

impl AlarmController {
    pub const fn new(countdown_ms: u32) -> Self {
        Self { countdown_ms }
    }

    /// Rising edge on the intrusion input.
    pub fn intrusion_edge<M: RawMutex>(&self, state: &SharedState<M>) -> Vec<NodeAction> {
        let ctx = PanelLogContext::new("alarm", state.self_id());
        if !state.is_locked() {
            my_debug!(ctx, "Intrusion input ignored while disarmed.");
            return Vec::new();
        }
        if state.is_intrusion_timer_active() || state.is_alarm_active() {
            my_debug!(ctx, "Intrusion input ignored, countdown or alarm already running.");
            return Vec::new();
        }
        state.set_intrusion_timer_active(true);
        my_info!(ctx, "Intrusion detected, alarm in {} ms unless disarmed.", self.countdown_ms);
        vec![
            NodeAction::StartCountdown(self.countdown_ms),
            NodeAction::SetIndicator(Indicator::TimerStatus, true),
            NodeAction::Show(text::INTRUSION),
            NodeAction::Broadcast(PanelMessage::Intrusion { node: own_node_byte(state) }),
        ]
    }

    /// The one-shot intrusion countdown fired.
    pub fn countdown_expired<M: RawMutex>(&self, state: &SharedState<M>) -> Vec<NodeAction> {
        let ctx = PanelLogContext::new("alarm", state.self_id());
        state.set_intrusion_timer_active(false);
        let mut actions = vec![NodeAction::SetIndicator(Indicator::TimerStatus, false)];
        if state.is_locked() {
            state.set_alarm_active(true);
            my_info!(ctx, "Countdown expired while armed, alarm raised.");
            actions.extend([
                NodeAction::SetIndicator(Indicator::Buzzer, true),
                NodeAction::Show(text::ALARM),
                NodeAction::Broadcast(PanelMessage::AlarmStarted { node: own_node_byte(state) }),
            ]);
        } else {
            my_debug!(ctx, "Countdown expired after disarm.");
        }
        actions
    }

    /// Unlocks the panel and starts a fresh liveness window.
    pub fn disarm<M: RawMutex>(&self, state: &SharedState<M>, origin: Origin) -> Vec<NodeAction> {
        let mut actions = vec![NodeAction::StopCountdown];
        state.set_locked(false);
        state.set_alarm_active(false);
        state.set_intrusion_timer_active(false);
        state.with_heartbeats(|table| table.reset_counters());
        my_info!(PanelLogContext::new("alarm", state.self_id()), "Disarmed ({:?}).", origin);

        actions.extend([
            NodeAction::SetIndicator(Indicator::Buzzer, false),
            NodeAction::SetIndicator(Indicator::TimerStatus, false),
            NodeAction::SetIndicator(Indicator::LockStatus, false),
            NodeAction::Show(text::UNLOCKED),
        ]);
        if origin == Origin::Local {
            actions.push(NodeAction::Broadcast(PanelMessage::Disarm { node: own_node_byte(state) }));
        }
        actions
    }

    pub fn arm<M: RawMutex>(&self, state: &SharedState<M>, origin: Origin) -> Vec<NodeAction> {
        state.set_locked(true);
        my_info!(PanelLogContext::new("alarm", state.self_id()), "Armed ({:?}).", origin);
        let mut actions = vec![
            NodeAction::SetIndicator(Indicator::LockStatus, true),
            NodeAction::Show(text::LOCKED),
        ];
        if origin == Origin::Local {
            actions.push(NodeAction::Broadcast(PanelMessage::Arm { node: own_node_byte(state) }));
        }
        actions
    }

    /// Local alarm raise (liveness timeout). Announced once per transition;
    /// while the alarm is already on the flag is only re-asserted.
    pub fn raise_alarm<M: RawMutex>(&self, state: &SharedState<M>) -> Vec<NodeAction> {
        if state.raise_alarm_flag() {
            return Vec::new();
        }
        my_info!(PanelLogContext::new("alarm", state.self_id()), "Alarm raised.");
        vec![
            NodeAction::SetIndicator(Indicator::Buzzer, true),
            NodeAction::Show(text::ALARM),
            NodeAction::Broadcast(PanelMessage::AlarmStarted { node: own_node_byte(state) }),
        ]
    }

    /// A peer reported an alarm. Forced on without verification or echo.
    pub fn force_alarm<M: RawMutex>(&self, state: &SharedState<M>) -> Vec<NodeAction> {
        state.set_alarm_active(true);
        vec![
            NodeAction::SetIndicator(Indicator::Buzzer, true),
            NodeAction::Show(text::ALARM),
        ]
    }
}
