// crates/canpanel-rs-config/src/error.rs

use alloc::fmt;
use alloc::string::String;
use canpanel_rs::PanelError;
use quick_xml::errors::serialize::DeError;
use quick_xml::errors::serialize::SeError;

/// Errors that can occur while loading or saving a panel configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// An error from the underlying `quick-xml` deserializer.
    XmlParsing(DeError),

    /// An error from the underlying `quick-xml` serializer.
    XmlSerializing(SeError),

    /// An error occurred while writing the document header.
    FmtError(fmt::Error),

    /// An attribute is not a decimal or `0x` hexadecimal number, or does not
    /// fit the field it configures.
    InvalidNumber { attribute: &'static str, value: String },

    /// `@baudrate` is not one of the supported bit rates.
    UnsupportedBaudrate(u32),

    /// `@mode` does not name an operation mode.
    UnknownMode(String),

    /// `@defaultPassword` is not exactly four characters.
    InvalidPassword,

    /// The assembled configuration was rejected by the core.
    Validation(PanelError),
}

impl From<DeError> for ConfigError {
    fn from(e: DeError) -> Self {
        ConfigError::XmlParsing(e)
    }
}

impl From<SeError> for ConfigError {
    fn from(e: SeError) -> Self {
        ConfigError::XmlSerializing(e)
    }
}

impl From<fmt::Error> for ConfigError {
    fn from(e: fmt::Error) -> Self {
        ConfigError::FmtError(e)
    }
}

impl From<PanelError> for ConfigError {
    fn from(e: PanelError) -> Self {
        ConfigError::Validation(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::XmlParsing(e) => write!(f, "XML parsing error: {}", e),
            ConfigError::XmlSerializing(e) => write!(f, "XML serializing error: {}", e),
            ConfigError::FmtError(e) => write!(f, "Formatting error: {}", e),
            ConfigError::InvalidNumber { attribute, value } => {
                write!(f, "Invalid number '{}' for attribute: {}", value, attribute)
            }
            ConfigError::UnsupportedBaudrate(bps) => write!(f, "Unsupported baud rate: {} bit/s", bps),
            ConfigError::UnknownMode(mode) => write!(f, "Unknown operation mode: {}", mode),
            ConfigError::InvalidPassword => write!(f, "Default password must be exactly 4 characters"),
            ConfigError::Validation(e) => write!(f, "Validation error: {}", e),
        }
    }
}
