//! Password check and the change-password dialogue.

use crate::alarm::{AlarmController, Origin, own_node_byte};
use crate::log::{PanelLogContext, my_debug, my_info};
use crate::message::PanelMessage;
use crate::node::NodeAction;
use crate::store::SharedState;
use crate::text;
use crate::types::Password;
use alloc::vec;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeStep {
    Old,
    New,
    Confirm(Password),
}

/// Consumes codes delivered by the keypad collector. Owned by the password task.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    alarm: AlarmController,
    change: Option<ChangeStep>,
}

impl PasswordManager {
    pub const fn new(alarm: AlarmController) -> Self {
        Self { alarm, change: None }
    }

    pub fn is_changing(&self) -> bool {
        self.change.is_some()
    }

    /// A complete code arrived from the keypad.
    pub fn code_entered<M: RawMutex>(&mut self, state: &SharedState<M>, code: Password) -> Vec<NodeAction> {
        match self.change {
            Some(step) => self.change_step(state, step, code),
            None => self.check(state, code),
        }
    }

    /// The mailbox wait timed out. Nothing changes; the task waits again.
    pub fn timed_out(&self) {
        my_debug!("[PWD] No code entered, waiting again.");
    }

    /// The change-password trigger was pressed.
    pub fn change_requested<M: RawMutex>(&mut self, state: &SharedState<M>) -> Vec<NodeAction> {
        if state.is_locked() {
            my_debug!(PanelLogContext::new("password", state.self_id()), "Change refused while armed.");
            return vec![NodeAction::Show(text::CHANGE_REFUSED)];
        }
        if self.change.is_some() {
            return Vec::new();
        }
        self.change = Some(ChangeStep::Old);
        state.set_password_change_in_progress(true);
        vec![NodeAction::Show(text::ENTER_OLD_PASSWORD)]
    }

    fn check<M: RawMutex>(&self, state: &SharedState<M>, code: Password) -> Vec<NodeAction> {
        if code != state.password() {
            my_info!(PanelLogContext::new("password", state.self_id()), "Wrong password entered.");
            return vec![NodeAction::Show(text::WRONG_PASSWORD)];
        }
        if state.is_locked() {
            self.alarm.disarm(state, Origin::Local)
        } else {
            self.alarm.arm(state, Origin::Local)
        }
    }

    fn change_step<M: RawMutex>(
        &mut self,
        state: &SharedState<M>,
        step: ChangeStep,
        code: Password,
    ) -> Vec<NodeAction> {
        if state.is_locked() {
            return self.abort(state, text::CHANGE_ABORTED);
        }
        match step {
            ChangeStep::Old if code == state.password() => {
                self.change = Some(ChangeStep::New);
                vec![NodeAction::Show(text::ENTER_NEW_PASSWORD)]
            }
            ChangeStep::Old => self.abort(state, text::WRONG_PASSWORD),
            ChangeStep::New => {
                self.change = Some(ChangeStep::Confirm(code));
                vec![NodeAction::Show(text::CONFIRM_PASSWORD)]
            }
            ChangeStep::Confirm(new) if code == new => {
                self.change = None;
                state.set_password(new);
                state.set_password_change_in_progress(false);
                my_info!(PanelLogContext::new("password", state.self_id()), "Password changed.");
                vec![
                    NodeAction::Show(text::PASSWORD_CHANGED),
                    NodeAction::Broadcast(PanelMessage::NewPassword {
                        node: own_node_byte(state),
                        password: new,
                    }),
                ]
            }
            ChangeStep::Confirm(_) => self.abort(state, text::PASSWORDS_DIFFER),
        }
    }

    fn abort<M: RawMutex>(&mut self, state: &SharedState<M>, reason: &'static str) -> Vec<NodeAction> {
        self.change = None;
        state.set_password_change_in_progress(false);
        my_info!(PanelLogContext::new("password", state.self_id()), "Password change aborted: {}.", reason);
        vec![NodeAction::Show(reason)]
    }
}
