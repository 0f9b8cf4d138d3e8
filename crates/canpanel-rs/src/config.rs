//! Static panel configuration.

use crate::can::filter::{FILTER_SLOTS, MASK_SLOTS};
use crate::can::{Baudrate, ModeWait, OperationMode};
use crate::hal::PanelError;
use crate::types::{
    BOOTSTRAP_TICKS, DEFAULT_ID_OFFSET, DEFAULT_PASSWORD, HEARTBEAT_PERIOD_MS, INTRUSION_COUNTDOWN_MS,
    LIVENESS_TIMEOUT_TICKS, MAX_STANDARD_ID, MessageType, PASSWORD_TIMEOUT_MS, Password, TICK_PERIOD_MS,
};
use alloc::vec::Vec;

/// One acceptance filter with the mask it compares through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub filter_slot: u8,
    pub mask_slot: u8,
    pub identifier: u16,
    pub mask: u16,
}

/// Everything a panel needs to boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub identifier_offset: u16,
    pub baudrate: Baudrate,
    pub mode: OperationMode,
    pub mode_wait: ModeWait,
    pub default_password: Password,
    pub tick_period_ms: u32,
    pub liveness_timeout_ticks: u16,
    pub bootstrap_ticks: u16,
    pub heartbeat_period_ms: u32,
    pub intrusion_countdown_ms: u32,
    pub password_timeout_ms: u32,
    pub filters: Vec<FilterConfig>,
}

impl PanelConfig {
    /// One exact-match filter per panel message for `offset`, all through
    /// mask 0. Filter `n` points at receive buffer `n`, so different message
    /// types never compete for the same buffer.
    pub fn default_filters(offset: u16) -> Vec<FilterConfig> {
        MessageType::ALL
            .iter()
            .zip(0u8..)
            .map(|(message_type, slot)| FilterConfig {
                filter_slot: slot,
                mask_slot: 0,
                identifier: message_type.identifier(offset),
                mask: MAX_STANDARD_ID,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), PanelError> {
        if MessageType::NewPassword.identifier(self.identifier_offset) > MAX_STANDARD_ID
            || self.identifier_offset > MAX_STANDARD_ID
        {
            return Err(PanelError::InvalidConfig("identifier offset leaves the 11-bit range"));
        }
        if self.tick_period_ms == 0 || self.heartbeat_period_ms == 0 {
            return Err(PanelError::InvalidConfig("periods must be non-zero"));
        }
        if self.liveness_timeout_ticks == 0 || self.bootstrap_ticks == 0 {
            return Err(PanelError::InvalidConfig("tick thresholds must be non-zero"));
        }
        if !self
            .default_password
            .as_bytes()
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
        {
            return Err(PanelError::InvalidConfig("password must be typed on the hex keypad"));
        }
        for f in &self.filters {
            if f.filter_slot >= FILTER_SLOTS {
                return Err(PanelError::InvalidFilterSlot(f.filter_slot));
            }
            if f.mask_slot >= MASK_SLOTS {
                return Err(PanelError::InvalidMaskSlot(f.mask_slot));
            }
            if f.identifier > MAX_STANDARD_ID || f.mask > MAX_STANDARD_ID {
                return Err(PanelError::InvalidIdentifier(f.identifier.max(f.mask)));
            }
        }
        Ok(())
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            identifier_offset: DEFAULT_ID_OFFSET,
            baudrate: Baudrate::Kbps500,
            mode: OperationMode::Normal,
            mode_wait: ModeWait::default(),
            default_password: DEFAULT_PASSWORD,
            tick_period_ms: TICK_PERIOD_MS,
            liveness_timeout_ticks: LIVENESS_TIMEOUT_TICKS,
            bootstrap_ticks: BOOTSTRAP_TICKS,
            heartbeat_period_ms: HEARTBEAT_PERIOD_MS,
            intrusion_countdown_ms: INTRUSION_COUNTDOWN_MS,
            password_timeout_ms: PASSWORD_TIMEOUT_MS,
            filters: Self::default_filters(DEFAULT_ID_OFFSET),
        }
    }
}
