//! Serializes a `PanelConfig` into a `<PanelConfiguration>` XML document.

use crate::error::ConfigError;
use crate::model::{self, Bus, Filter, Filters, Liveness, Security};
use alloc::format;
use alloc::string::{String, ToString};
use canpanel_rs::can::ModeWait;
use canpanel_rs::{FilterConfig, PanelConfig};
use core::fmt::Write;
use serde::Serialize;

/// Writes every setting of `config`, so the document loads back to an equal
/// configuration regardless of future default changes.
///
/// Identifiers and masks are written in hexadecimal, everything else in
/// decimal.
pub fn save_config_to_string(config: &PanelConfig) -> Result<String, ConfigError> {
    let document = model::PanelConfiguration {
        bus: Some(Bus {
            baudrate: Some(config.baudrate.bits_per_second().to_string()),
            identifier_offset: Some(format!("{:#x}", config.identifier_offset)),
            mode: Some(format!("{:?}", config.mode)),
            mode_switch_polls: Some(match config.mode_wait {
                ModeWait::Forever => String::from("forever"),
                ModeWait::Polls(n) => n.to_string(),
            }),
        }),
        security: Some(Security {
            default_password: Some(
                core::str::from_utf8(config.default_password.as_bytes())
                    .map_err(|_| ConfigError::InvalidPassword)?
                    .to_string(),
            ),
            intrusion_countdown_ms: Some(config.intrusion_countdown_ms.to_string()),
            password_timeout_ms: Some(config.password_timeout_ms.to_string()),
        }),
        liveness: Some(Liveness {
            tick_ms: Some(config.tick_period_ms.to_string()),
            timeout_ticks: Some(config.liveness_timeout_ticks.to_string()),
            bootstrap_ticks: Some(config.bootstrap_ticks.to_string()),
            heartbeat_period_ms: Some(config.heartbeat_period_ms.to_string()),
        }),
        filters: Some(Filters {
            filter: config.filters.iter().map(build_filter).collect(),
        }),
    };

    let mut buffer = String::new();
    write!(&mut buffer, "{}", "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n")?;

    let mut serializer = quick_xml::se::Serializer::new(&mut buffer);
    serializer.indent(' ', 2);

    document.serialize(serializer)?;
    Ok(buffer)
}

fn build_filter(filter: &FilterConfig) -> Filter {
    Filter {
        slot: filter.filter_slot.to_string(),
        mask_slot: Some(filter.mask_slot.to_string()),
        id: format!("{:#x}", filter.identifier),
        mask: format!("{:#x}", filter.mask),
    }
}
