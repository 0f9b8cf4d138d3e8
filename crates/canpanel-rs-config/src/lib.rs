// src/lib.rs

#![no_std]
#![doc = "Loads and saves canpanel-rs panel configuration as XML."]
#![doc = ""]
#![doc = "This `no_std + alloc` library maps a `<PanelConfiguration>` document onto"]
#![doc = "the core `PanelConfig`:"]
#![doc = "- `load_config_from_str`: parsing a document, missing elements keep their defaults."]
#![doc = "- `save_config_to_string`: writing a complete document for a configuration."]

extern crate alloc;

// --- Crate Modules ---

mod builder;
mod error;
mod model;
mod parser;

// --- Public API Re-exports ---

pub use builder::save_config_to_string;
pub use error::ConfigError;
pub use parser::{load_config_from_str, parse_number};
