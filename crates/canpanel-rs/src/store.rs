//! Shared state store.
//!
//! Every field sits behind its own mutex and every accessor holds that mutex
//! for exactly one read or one write. Sequences that touch several fields
//! (check `locked`, then set `alarm_active`) are therefore not atomic as a
//! whole; callers must tolerate another task interleaving between steps.

use crate::liveness::HeartbeatTable;
use crate::types::{NodeId, Password};
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// A single `Copy` value behind a dedicated mutex.
pub struct Guarded<M: RawMutex, T: Copy> {
    inner: Mutex<M, Cell<T>>,
}

impl<M: RawMutex, T: Copy> Guarded<M, T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock(|cell| cell.get())
    }

    pub fn set(&self, value: T) {
        self.inner.lock(|cell| cell.set(value));
    }

    /// Stores `value` and returns the previous one under a single acquisition.
    pub fn replace(&self, value: T) -> T {
        self.inner.lock(|cell| cell.replace(value))
    }
}

/// All cross-task mutable state of one panel.
///
/// `M` picks the locking primitive: `CriticalSectionRawMutex` when tasks and
/// interrupts share the store, `NoopRawMutex` for single-threaded use.
pub struct SharedState<M: RawMutex> {
    locked: Guarded<M, bool>,
    alarm_active: Guarded<M, bool>,
    intrusion_timer_active: Guarded<M, bool>,
    password_change_in_progress: Guarded<M, bool>,
    password: Guarded<M, Password>,
    self_id: Guarded<M, Option<NodeId>>,
    heartbeats: Mutex<M, RefCell<HeartbeatTable>>,
}

impl<M: RawMutex> SharedState<M> {
    /// Boot state: disarmed, no alarm, no countdown, no node id yet.
    pub fn new(password: Password) -> Self {
        Self {
            locked: Guarded::new(false),
            alarm_active: Guarded::new(false),
            intrusion_timer_active: Guarded::new(false),
            password_change_in_progress: Guarded::new(false),
            password: Guarded::new(password),
            self_id: Guarded::new(None),
            heartbeats: Mutex::new(RefCell::new(HeartbeatTable::new())),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.set(locked);
    }

    pub fn is_alarm_active(&self) -> bool {
        self.alarm_active.get()
    }

    pub fn set_alarm_active(&self, active: bool) {
        self.alarm_active.set(active);
    }

    /// Sets the alarm flag and reports whether it was already set.
    pub fn raise_alarm_flag(&self) -> bool {
        self.alarm_active.replace(true)
    }

    pub fn is_intrusion_timer_active(&self) -> bool {
        self.intrusion_timer_active.get()
    }

    pub fn set_intrusion_timer_active(&self, active: bool) {
        self.intrusion_timer_active.set(active);
    }

    pub fn is_password_change_in_progress(&self) -> bool {
        self.password_change_in_progress.get()
    }

    pub fn set_password_change_in_progress(&self, in_progress: bool) {
        self.password_change_in_progress.set(in_progress);
    }

    pub fn password(&self) -> Password {
        self.password.get()
    }

    pub fn set_password(&self, password: Password) {
        self.password.set(password);
    }

    pub fn self_id(&self) -> Option<NodeId> {
        self.self_id.get()
    }

    pub fn set_self_id(&self, id: NodeId) {
        self.self_id.set(Some(id));
    }

    /// Runs `f` with exclusive access to the heartbeat table.
    ///
    /// `f` must not call back into `with_heartbeats`.
    pub fn with_heartbeats<R>(&self, f: impl FnOnce(&mut HeartbeatTable) -> R) -> R {
        self.heartbeats.lock(|table| f(&mut table.borrow_mut()))
    }

    /// Copy of the heartbeat table.
    pub fn heartbeats(&self) -> HeartbeatTable {
        self.with_heartbeats(|table| *table)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::types::DEFAULT_PASSWORD;
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};

    #[test]
    fn boots_disarmed_with_default_password() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        assert!(!state.is_locked());
        assert!(!state.is_alarm_active());
        assert!(!state.is_intrusion_timer_active());
        assert!(!state.is_password_change_in_progress());
        assert_eq!(state.password(), DEFAULT_PASSWORD);
        assert_eq!(state.self_id(), None);
        assert_eq!(state.heartbeats().active_count(), 0);
    }

    #[test]
    fn fields_are_independent() {
        let state: SharedState<NoopRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        state.set_locked(true);
        state.set_intrusion_timer_active(true);
        assert!(state.is_locked());
        assert!(!state.is_alarm_active());
        assert!(!state.raise_alarm_flag());
        assert!(state.raise_alarm_flag());
        state.set_password(Password(*b"0000"));
        assert_eq!(state.password(), Password(*b"0000"));
        assert!(state.is_intrusion_timer_active());
    }

    #[test]
    fn shared_between_threads() {
        let state: SharedState<CriticalSectionRawMutex> = SharedState::new(DEFAULT_PASSWORD);
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..1000 {
                    state.with_heartbeats(|t| t.record(NodeId(1)));
                }
            });
            s.spawn(|| {
                for _ in 0..1000 {
                    state.with_heartbeats(|t| t.record(NodeId(2)));
                }
            });
        });
        let table = state.heartbeats();
        assert!(table.entry(NodeId(1)).active);
        assert!(table.entry(NodeId(2)).active);
        assert_eq!(table.active_count(), 2);
    }
}
