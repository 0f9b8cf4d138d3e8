#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for the action lists returned by the node components.
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod hal;
pub mod config;
pub(crate) mod log;

// --- Transport ---
pub mod can;
#[cfg(feature = "std")]
pub mod emulation;

// --- Application Layers ---
pub mod message;
pub mod store;
pub mod liveness;
pub mod alarm;
pub mod password;
pub mod keypad;
pub mod text;

// --- Node Abstraction ---
pub mod node;

// --- Top-level Exports ---
pub use types::{Indicator, MessageType, NodeId, Password};
pub use hal::{Board, CanPeripheral, Display, Indicators, Keypad, PanelError, PanelInputs};
pub use config::{FilterConfig, PanelConfig};
pub use can::{Baudrate, CanDriver, CanFrame, ModeWait, OperationMode};
pub use message::{Codec, Dispatcher, MessageCodec, PanelMessage};
pub use store::SharedState;
pub use liveness::{HeartbeatTable, LivenessTracker};
pub use alarm::{AlarmController, AlarmState, Origin};
pub use password::PasswordManager;
pub use keypad::{KeyEvent, KeypadCollector};
pub use node::{Node, NodeAction, PanelNode};
