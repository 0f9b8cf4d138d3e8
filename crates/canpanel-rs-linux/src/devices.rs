//! Host stand-ins for the panel's keypad, display, indicators and inputs.
//!
//! Every device is a cheap handle over shared state, so a clone can be
//! handed to the runtime while the original stays with the caller (a test,
//! a stdin reader) to drive inputs or inspect outputs.

use canpanel_rs::keypad::KEY_CHARS;
use canpanel_rs::{Board, Display, Indicator, Indicators, Keypad, PanelError, PanelInputs};
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keypad fed from software. Each press is held for two scans, then released.
#[derive(Debug, Clone, Default)]
pub struct SharedKeypad {
    scans: Arc<Mutex<VecDeque<Option<u8>>>>,
}

impl SharedKeypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one key press by scan code (`0..=15`).
    pub fn press(&self, key: u8) {
        lock(&self.scans).extend([Some(key), Some(key), None]);
    }

    /// Queues the keys printed as `code`, e.g. `"B169"`. Characters that are
    /// not on the keypad are skipped.
    pub fn type_code(&self, code: &str) {
        for c in code.chars() {
            let upper = c.to_ascii_uppercase() as u8;
            match KEY_CHARS.iter().position(|k| *k == upper) {
                Some(key) => self.press(key as u8),
                None => warn!("[Keypad] '{}' is not a keypad key, skipped.", c),
            }
        }
    }

    /// Scans still waiting to be read.
    pub fn pending(&self) -> usize {
        lock(&self.scans).len()
    }
}

impl Keypad for SharedKeypad {
    fn scan(&mut self) -> Option<u8> {
        lock(&self.scans).pop_front().flatten()
    }
}

/// Display that logs and remembers every text it is asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// All texts shown so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.lines).last().cloned()
    }

    pub fn contains(&self, text: &str) -> bool {
        lock(&self.lines).iter().any(|line| line == text)
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, text: &str) {
        info!("[Display] {}", text);
        lock(&self.lines).push(text.to_string());
    }
}

/// Indicator outputs kept in a map, with a count of level changes.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicators {
    levels: Arc<Mutex<HashMap<Indicator, (bool, usize)>>>,
}

impl RecordingIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, indicator: Indicator) -> bool {
        lock(&self.levels).get(&indicator).is_some_and(|(on, _)| *on)
    }

    /// How many times `indicator` changed level.
    pub fn changes(&self, indicator: Indicator) -> usize {
        lock(&self.levels).get(&indicator).map_or(0, |(_, changes)| *changes)
    }
}

impl Indicators for RecordingIndicators {
    fn set(&mut self, indicator: Indicator, on: bool) {
        let mut levels = lock(&self.levels);
        let entry = levels.entry(indicator).or_insert((false, 0));
        if entry.0 != on {
            entry.0 = on;
            entry.1 += 1;
        }
    }
}

/// Intrusion sensor and change-password button levels.
#[derive(Debug, Clone, Default)]
pub struct SharedInputs {
    intrusion: Arc<AtomicBool>,
    change_password: Arc<AtomicBool>,
}

impl SharedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_intrusion(&self, level: bool) {
        self.intrusion.store(level, Ordering::Relaxed);
    }

    pub fn set_change_password(&self, level: bool) {
        self.change_password.store(level, Ordering::Relaxed);
    }
}

impl PanelInputs for SharedInputs {
    fn intrusion(&mut self) -> bool {
        self.intrusion.load(Ordering::Relaxed)
    }

    fn change_password(&mut self) -> bool {
        self.change_password.load(Ordering::Relaxed)
    }
}

/// A Linux host has no pins or clocks to bring up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBoard;

impl Board for HostBoard {
    fn init(&mut self) -> Result<(), PanelError> {
        info!("[Board] Host board, nothing to configure.");
        Ok(())
    }
}
