use super::codec::{MessageCodec, PanelMessage};
use crate::alarm::{AlarmController, Origin};
use crate::can::CanFrame;
use crate::hal::PanelError;
use crate::log::{PanelLogContext, my_debug, my_info, my_trace, my_warn};
use crate::node::NodeAction;
use crate::store::SharedState;
use crate::text;
use crate::types::{Indicator, NodeId};
use alloc::vec;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Routes received frames into the store and the alarm state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatcher {
    codec: MessageCodec,
    alarm: AlarmController,
}

impl Dispatcher {
    pub const fn new(codec: MessageCodec, alarm: AlarmController) -> Self {
        Self { codec, alarm }
    }

    /// Handles one received frame. Frames that are not panel messages are
    /// dropped without side effects.
    pub fn dispatch<M: RawMutex>(&self, frame: &CanFrame, state: &SharedState<M>) -> Vec<NodeAction> {
        match self.codec.decode(frame) {
            Ok(message) => self.handle(message, state),
            Err(e @ PanelError::PayloadTooShort { .. }) => {
                my_debug!("[RX] Dropping {:?}: {}", frame, e);
                Vec::new()
            }
            Err(e) => {
                my_trace!("[RX] Ignoring {:?}: {}", frame, e);
                Vec::new()
            }
        }
    }

    pub fn handle<M: RawMutex>(&self, message: PanelMessage, state: &SharedState<M>) -> Vec<NodeAction> {
        let ctx = PanelLogContext::new("rx", state.self_id());
        match message {
            PanelMessage::Heartbeat { node } => match NodeId::try_from(node) {
                Ok(id) => {
                    if state.self_id() == Some(id) {
                        my_warn!(ctx, "Heartbeat from another node using our id {}.", id);
                    }
                    state.with_heartbeats(|table| table.record(id));
                    my_trace!(ctx, "Heartbeat from node {}.", id);
                    vec![NodeAction::ToggleIndicator(Indicator::BusActivity)]
                }
                Err(e) => {
                    my_debug!(ctx, "Heartbeat ignored: {}", e);
                    Vec::new()
                }
            },
            PanelMessage::Intrusion { node } => {
                my_info!(ctx, "Node {} reports an intrusion.", node);
                vec![NodeAction::Show(text::REMOTE_INTRUSION)]
            }
            PanelMessage::Disarm { node } => {
                my_debug!(ctx, "Disarm from node {}.", node);
                self.alarm.disarm(state, Origin::Remote)
            }
            PanelMessage::Arm { node } => {
                my_debug!(ctx, "Arm from node {}.", node);
                self.alarm.arm(state, Origin::Remote)
            }
            PanelMessage::AlarmStarted { node } => {
                my_info!(ctx, "Node {} started the alarm.", node);
                self.alarm.force_alarm(state)
            }
            PanelMessage::NewPassword { node, password } => {
                state.set_password(password);
                my_info!(ctx, "Password replaced by node {}.", node);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DEFAULT_ID_OFFSET, DEFAULT_PASSWORD, Password};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn setup() -> (Dispatcher, SharedState<NoopRawMutex>) {
        let dispatcher = Dispatcher::new(MessageCodec::new(DEFAULT_ID_OFFSET), AlarmController::default());
        let state = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(0));
        (dispatcher, state)
    }

    fn frame(message: PanelMessage) -> CanFrame {
        MessageCodec::new(DEFAULT_ID_OFFSET).encode(&message).unwrap()
    }

    #[test]
    fn heartbeat_activates_the_sender() {
        let (dispatcher, state) = setup();
        dispatcher.dispatch(&frame(PanelMessage::Heartbeat { node: 7 }), &state);
        assert!(state.heartbeats().entry(NodeId(7)).active);

        dispatcher.dispatch(&frame(PanelMessage::Heartbeat { node: 10 }), &state);
        assert_eq!(state.heartbeats().active_count(), 1);
    }

    #[test]
    fn remote_disarm_and_arm_change_the_lock_without_echo() {
        let (dispatcher, state) = setup();
        let actions = dispatcher.dispatch(&frame(PanelMessage::Arm { node: 3 }), &state);
        assert!(state.is_locked());
        assert!(!actions.iter().any(|a| matches!(a, NodeAction::Broadcast(_))));

        let actions = dispatcher.dispatch(&frame(PanelMessage::Disarm { node: 3 }), &state);
        assert!(!state.is_locked());
        assert!(!actions.iter().any(|a| matches!(a, NodeAction::Broadcast(_))));
    }

    #[test]
    fn alarm_started_forces_the_alarm_even_when_disarmed() {
        let (dispatcher, state) = setup();
        dispatcher.dispatch(&frame(PanelMessage::AlarmStarted { node: 1 }), &state);
        assert!(state.is_alarm_active());
    }

    #[test]
    fn new_password_is_adopted() {
        let (dispatcher, state) = setup();
        let password = Password(*b"7777");
        dispatcher.dispatch(&frame(PanelMessage::NewPassword { node: 2, password }), &state);
        assert_eq!(state.password(), password);
    }

    #[test]
    fn intrusion_only_shows_text() {
        let (dispatcher, state) = setup();
        state.set_locked(true);
        let actions = dispatcher.dispatch(&frame(PanelMessage::Intrusion { node: 4 }), &state);
        assert_eq!(actions, vec![NodeAction::Show(text::REMOTE_INTRUSION)]);
        assert!(!state.is_intrusion_timer_active());
        assert!(!state.is_alarm_active());
    }

    #[test]
    fn unknown_identifiers_are_ignored() {
        let (dispatcher, state) = setup();
        let foreign = CanFrame::new(0x099, &[1, 2, 3]).unwrap();
        assert!(dispatcher.dispatch(&foreign, &state).is_empty());
        assert!(!state.is_locked());
    }

    #[test]
    fn truncated_new_password_keeps_the_old_one() {
        let (dispatcher, state) = setup();
        let truncated = CanFrame::new(DEFAULT_ID_OFFSET + 24, &[1, b'1', b'2']).unwrap();
        assert!(dispatcher.dispatch(&truncated, &state).is_empty());
        assert_eq!(state.password(), DEFAULT_PASSWORD);

        let empty_heartbeat = CanFrame::new(DEFAULT_ID_OFFSET, &[]).unwrap();
        assert!(dispatcher.dispatch(&empty_heartbeat, &state).is_empty());
        assert_eq!(state.heartbeats().active_count(), 0);
    }
}
