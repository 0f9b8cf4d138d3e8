use crate::alarm::{AlarmController, AlarmState};
use crate::can::CanFrame;
use crate::config::PanelConfig;
use crate::liveness::LivenessTracker;
use crate::message::{Dispatcher, MessageCodec, PanelMessage};
use crate::password::PasswordManager;
use crate::store::SharedState;
use crate::types::{Indicator, Password};
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Represents the side effects a panel component asks the platform to
/// perform in response to an event or a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    /// Encode the message and send it on the bus.
    Broadcast(PanelMessage),
    /// Put a text on the display.
    Show(&'static str),
    SetIndicator(Indicator, bool),
    ToggleIndicator(Indicator),
    /// (Re)start the one-shot intrusion countdown with this duration in ms.
    StartCountdown(u32),
    /// Stop the intrusion countdown if it is running.
    StopCountdown,
}

/// A trait that defines the common interface for a bus node.
pub trait Node {
    /// Processes a frame taken from the receive queue.
    fn process_frame(&mut self, frame: &CanFrame) -> Vec<NodeAction>;
    /// Called by the application every liveness tick.
    fn tick(&mut self) -> Vec<NodeAction>;
    /// The heartbeat broadcast timer fired.
    fn heartbeat_due(&mut self) -> Vec<NodeAction>;
    /// Rising edge on the intrusion input.
    fn intrusion_edge(&mut self) -> Vec<NodeAction>;
    /// The one-shot intrusion countdown ran out.
    fn countdown_expired(&mut self) -> Vec<NodeAction>;
    /// A complete 4-key code came out of the keypad collector.
    fn code_entered(&mut self, code: Password) -> Vec<NodeAction>;
    /// No code arrived within the password timeout.
    fn password_timed_out(&mut self);
    fn change_password_requested(&mut self) -> Vec<NodeAction>;
    /// Returns the current alarm state of the node.
    fn alarm_state(&self) -> AlarmState;
}

/// All panel components wired to one store.
///
/// Suited to single-threaded schedulers (a super-loop or a simulator). The
/// multi-task runtime drives the same components individually.
pub struct PanelNode<'s, M: RawMutex> {
    state: &'s SharedState<M>,
    codec: MessageCodec,
    dispatcher: Dispatcher,
    liveness: LivenessTracker,
    alarm: AlarmController,
    password: PasswordManager,
}

impl<'s, M: RawMutex> PanelNode<'s, M> {
    pub fn new(state: &'s SharedState<M>, config: &PanelConfig) -> Self {
        let codec = MessageCodec::new(config.identifier_offset);
        let alarm = AlarmController::new(config.intrusion_countdown_ms);
        Self {
            state,
            codec,
            dispatcher: Dispatcher::new(codec, alarm),
            liveness: LivenessTracker::from_config(config),
            alarm,
            password: PasswordManager::new(alarm),
        }
    }

    pub fn state(&self) -> &'s SharedState<M> {
        self.state
    }

    pub fn codec(&self) -> MessageCodec {
        self.codec
    }
}

impl<M: RawMutex> Node for PanelNode<'_, M> {
    fn process_frame(&mut self, frame: &CanFrame) -> Vec<NodeAction> {
        self.dispatcher.dispatch(frame, self.state)
    }

    fn tick(&mut self) -> Vec<NodeAction> {
        self.liveness.on_tick(self.state)
    }

    fn heartbeat_due(&mut self) -> Vec<NodeAction> {
        self.liveness.on_heartbeat_timer(self.state)
    }

    fn intrusion_edge(&mut self) -> Vec<NodeAction> {
        self.alarm.intrusion_edge(self.state)
    }

    fn countdown_expired(&mut self) -> Vec<NodeAction> {
        self.alarm.countdown_expired(self.state)
    }

    fn code_entered(&mut self, code: Password) -> Vec<NodeAction> {
        self.password.code_entered(self.state, code)
    }

    fn password_timed_out(&mut self) {
        self.password.timed_out();
    }

    fn change_password_requested(&mut self) -> Vec<NodeAction> {
        self.password.change_requested(self.state)
    }

    fn alarm_state(&self) -> AlarmState {
        AlarmState::from_store(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Codec;
    use alloc::vec;
    use crate::types::{DEFAULT_PASSWORD, NodeId};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn locked_panel_unlocks_with_b169_and_sends_one_disarm() {
        let config = PanelConfig::default();
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(4));
        state.set_locked(true);
        let mut node = PanelNode::new(&state, &config);

        let actions = node.code_entered(Password(*b"B169"));
        let frames: Vec<CanFrame> = actions
            .iter()
            .filter_map(|a| match a {
                NodeAction::Broadcast(m) => Some(m.encode(config.identifier_offset).unwrap()),
                _ => None,
            })
            .collect();

        assert_eq!(node.alarm_state(), AlarmState::Disarmed);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id(), config.identifier_offset + 2);
        assert_eq!(frames[0].payload(), &[4]);
    }

    #[test]
    fn intrusion_sequence_runs_through_a_node_trait_object() {
        let config = PanelConfig::default();
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_self_id(NodeId(2));
        let mut panel = PanelNode::new(&state, &config);
        let node: &mut dyn Node = &mut panel;

        node.code_entered(DEFAULT_PASSWORD);
        assert_eq!(node.alarm_state(), AlarmState::Armed);

        let actions = node.intrusion_edge();
        assert!(actions.contains(&NodeAction::StartCountdown(config.intrusion_countdown_ms)));
        assert_eq!(node.alarm_state(), AlarmState::IntrusionDetected);

        let actions = node.countdown_expired();
        assert!(actions.contains(&NodeAction::SetIndicator(Indicator::Buzzer, true)));
        assert_eq!(node.alarm_state(), AlarmState::AlarmRaised);

        assert!(!node.heartbeat_due().is_empty());
        node.password_timed_out();
        assert_eq!(
            node.change_password_requested(),
            vec![NodeAction::Show(crate::text::CHANGE_REFUSED)]
        );
    }
}
