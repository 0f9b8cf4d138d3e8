// crates/canpanel-rs-config/src/model.rs

//! Serde mirror of the `<PanelConfiguration>` document.
//!
//! Every attribute is kept as a string so numbers may be written in decimal
//! or hexadecimal; conversion happens in the parser.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename = "PanelConfiguration")]
pub struct PanelConfiguration {
    #[serde(rename = "Bus", default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<Bus>,

    #[serde(rename = "Security", default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,

    #[serde(rename = "Liveness", default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<Liveness>,

    #[serde(rename = "Filters", default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

/// `<Bus>`: controller bring-up.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Bus {
    /// Bit rate in bit/s.
    #[serde(rename = "@baudrate", default, skip_serializing_if = "Option::is_none")]
    pub baudrate: Option<String>,

    #[serde(rename = "@identifierOffset", default, skip_serializing_if = "Option::is_none")]
    pub identifier_offset: Option<String>,

    #[serde(rename = "@mode", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Poll budget for mode switches and transmit waits, or `forever`.
    #[serde(rename = "@modeSwitchPolls", default, skip_serializing_if = "Option::is_none")]
    pub mode_switch_polls: Option<String>,
}

/// `<Security>`: password and countdown settings.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Security {
    #[serde(rename = "@defaultPassword", default, skip_serializing_if = "Option::is_none")]
    pub default_password: Option<String>,

    #[serde(rename = "@intrusionCountdownMs", default, skip_serializing_if = "Option::is_none")]
    pub intrusion_countdown_ms: Option<String>,

    #[serde(rename = "@passwordTimeoutMs", default, skip_serializing_if = "Option::is_none")]
    pub password_timeout_ms: Option<String>,
}

/// `<Liveness>`: heartbeat protocol timing.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Liveness {
    #[serde(rename = "@tickMs", default, skip_serializing_if = "Option::is_none")]
    pub tick_ms: Option<String>,

    #[serde(rename = "@timeoutTicks", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ticks: Option<String>,

    #[serde(rename = "@bootstrapTicks", default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_ticks: Option<String>,

    #[serde(rename = "@heartbeatPeriodMs", default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_period_ms: Option<String>,
}

/// `<Filters>`: replaces the default acceptance set when present.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Filters {
    #[serde(rename = "Filter", default)]
    pub filter: Vec<Filter>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Filter {
    #[serde(rename = "@slot")]
    pub slot: String,

    #[serde(rename = "@maskSlot", default, skip_serializing_if = "Option::is_none")]
    pub mask_slot: Option<String>,

    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@mask")]
    pub mask: String,
}
