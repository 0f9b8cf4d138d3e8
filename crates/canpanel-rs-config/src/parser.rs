// src/parser.rs

use crate::error::ConfigError;
use crate::model;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use canpanel_rs::can::ModeWait;
use canpanel_rs::{Baudrate, FilterConfig, OperationMode, PanelConfig, Password};
use core::num::ParseIntError;
use log::debug;

/// Parses a `<PanelConfiguration>` document into a validated `PanelConfig`.
///
/// Elements and attributes that are absent keep their default values. When
/// `<Filters>` is absent the default acceptance set follows the configured
/// identifier offset.
///
/// # Errors
/// Returns a `ConfigError` if the XML is malformed, a value cannot be
/// converted, or the resulting configuration fails validation.
pub fn load_config_from_str(xml_content: &str) -> Result<PanelConfig, ConfigError> {
    let document: model::PanelConfiguration = quick_xml::de::from_str(xml_content)?;
    let mut config = PanelConfig::default();

    if let Some(bus) = &document.bus {
        apply_bus(bus, &mut config)?;
    }
    if let Some(security) = &document.security {
        apply_security(security, &mut config)?;
    }
    if let Some(liveness) = &document.liveness {
        apply_liveness(liveness, &mut config)?;
    }
    config.filters = match &document.filters {
        Some(filters) => filters.filter.iter().map(parse_filter).collect::<Result<Vec<_>, _>>()?,
        None => PanelConfig::default_filters(config.identifier_offset),
    };

    config.validate()?;
    debug!(
        "Loaded panel configuration: offset {:#05x}, {} filter(s).",
        config.identifier_offset,
        config.filters.len()
    );
    Ok(config)
}

fn apply_bus(bus: &model::Bus, config: &mut PanelConfig) -> Result<(), ConfigError> {
    if let Some(value) = &bus.baudrate {
        let bps = parse_attr::<u32>(value, "baudrate")?;
        config.baudrate = Baudrate::from_bits_per_second(bps).ok_or(ConfigError::UnsupportedBaudrate(bps))?;
    }
    if let Some(value) = &bus.identifier_offset {
        config.identifier_offset = parse_attr(value, "identifierOffset")?;
    }
    if let Some(value) = &bus.mode {
        config.mode = parse_mode(value)?;
    }
    if let Some(value) = &bus.mode_switch_polls {
        config.mode_wait = if value.eq_ignore_ascii_case("forever") {
            ModeWait::Forever
        } else {
            ModeWait::Polls(parse_attr(value, "modeSwitchPolls")?)
        };
    }
    Ok(())
}

fn apply_security(security: &model::Security, config: &mut PanelConfig) -> Result<(), ConfigError> {
    if let Some(value) = &security.default_password {
        config.default_password = Password::from_bytes(value.as_bytes()).ok_or(ConfigError::InvalidPassword)?;
    }
    if let Some(value) = &security.intrusion_countdown_ms {
        config.intrusion_countdown_ms = parse_attr(value, "intrusionCountdownMs")?;
    }
    if let Some(value) = &security.password_timeout_ms {
        config.password_timeout_ms = parse_attr(value, "passwordTimeoutMs")?;
    }
    Ok(())
}

fn apply_liveness(liveness: &model::Liveness, config: &mut PanelConfig) -> Result<(), ConfigError> {
    if let Some(value) = &liveness.tick_ms {
        config.tick_period_ms = parse_attr(value, "tickMs")?;
    }
    if let Some(value) = &liveness.timeout_ticks {
        config.liveness_timeout_ticks = parse_attr(value, "timeoutTicks")?;
    }
    if let Some(value) = &liveness.bootstrap_ticks {
        config.bootstrap_ticks = parse_attr(value, "bootstrapTicks")?;
    }
    if let Some(value) = &liveness.heartbeat_period_ms {
        config.heartbeat_period_ms = parse_attr(value, "heartbeatPeriodMs")?;
    }
    Ok(())
}

fn parse_filter(filter: &model::Filter) -> Result<FilterConfig, ConfigError> {
    Ok(FilterConfig {
        filter_slot: parse_attr(&filter.slot, "slot")?,
        mask_slot: match &filter.mask_slot {
            Some(value) => parse_attr(value, "maskSlot")?,
            None => 0,
        },
        identifier: parse_attr(&filter.id, "id")?,
        mask: parse_attr(&filter.mask, "mask")?,
    })
}

fn parse_mode(value: &str) -> Result<OperationMode, ConfigError> {
    match value {
        "Normal" => Ok(OperationMode::Normal),
        "Disable" => Ok(OperationMode::Disable),
        "Loopback" => Ok(OperationMode::Loopback),
        "ListenOnly" => Ok(OperationMode::ListenOnly),
        "Configuration" => Ok(OperationMode::Configuration),
        "ListenAll" => Ok(OperationMode::ListenAll),
        other => Err(ConfigError::UnknownMode(other.to_string())),
    }
}

/// Parses a decimal or "0x..." hex string into a u32.
pub fn parse_number(s: &str) -> Result<u32, ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Parses a number and narrows it to the field's type.
fn parse_attr<T: TryFrom<u32>>(value: &str, attribute: &'static str) -> Result<T, ConfigError> {
    parse_number(value)
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| ConfigError::InvalidNumber {
            attribute,
            value: String::from(value),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_decimal_and_hex() {
        assert_eq!(parse_number("512"), Ok(512));
        assert_eq!(parse_number("0x200"), Ok(0x200));
        assert_eq!(parse_number(" 0X7E0 "), Ok(0x7E0));
        assert!(parse_number("0xZZ").is_err());
        assert!(parse_number("").is_err());
    }

    #[test]
    fn narrowing_reports_the_attribute() {
        let err = parse_attr::<u8>("300", "slot").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { attribute: "slot", .. }));
    }

    #[test]
    fn modes_are_matched_by_name() {
        assert_eq!(parse_mode("ListenOnly").unwrap(), OperationMode::ListenOnly);
        assert!(matches!(parse_mode("Sleep"), Err(ConfigError::UnknownMode(_))));
    }
}
