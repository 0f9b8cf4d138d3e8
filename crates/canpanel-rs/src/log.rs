use crate::types::NodeId;
use alloc::format;
use alloc::string::String;

/// Something that can describe where a log line comes from.
pub trait LogMetadata {
    fn meta(&self) -> String;
}

/// Identifies the component and the local node in log lines.
pub struct PanelLogContext {
    pub component: &'static str,
    pub node: Option<NodeId>,
}

impl PanelLogContext {
    pub const fn new(component: &'static str, node: Option<NodeId>) -> Self {
        Self { component, node }
    }
}

impl LogMetadata for PanelLogContext {
    fn meta(&self) -> String {
        match self.node {
            Some(id) => format!("{} node={}", self.component, id),
            None => format!("{} node=?", self.component),
        }
    }
}

// Level-specific macros. With a context first, the line is prefixed with the
// context metadata in brackets; otherwise it goes to `log` unchanged.

macro_rules! panel_log {
    ($level:ident, $ctx:expr, $fmt:literal $(, $($arg:tt)+)?) => {{
        let meta = $crate::log::LogMetadata::meta(&$ctx);
        log::$level!(concat!("[{}] ", $fmt), meta $(, $($arg)+)?);
    }};
    ($level:ident, $fmt:literal $(, $($arg:tt)+)?) => {
        log::$level!($fmt $(, $($arg)+)?)
    };
}

macro_rules! my_error {
    ($($t:tt)+) => { $crate::log::panel_log!(error, $($t)+) };
}

macro_rules! my_warn {
    ($($t:tt)+) => { $crate::log::panel_log!(warn, $($t)+) };
}

macro_rules! my_info {
    ($($t:tt)+) => { $crate::log::panel_log!(info, $($t)+) };
}

macro_rules! my_debug {
    ($($t:tt)+) => { $crate::log::panel_log!(debug, $($t)+) };
}

macro_rules! my_trace {
    ($($t:tt)+) => { $crate::log::panel_log!(trace, $($t)+) };
}

pub(crate) use {my_debug, my_error, my_info, my_trace, my_warn, panel_log};
