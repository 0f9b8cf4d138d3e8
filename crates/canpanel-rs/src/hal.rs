use crate::can::frame::FrameError;
use crate::can::mode::OperationMode;
use crate::can::buffer::BufferWords;
use crate::types::{Indicator, NodeIdError};
use core::fmt;

/// Defines a portable, descriptive Error type for the panel stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelError {
    /// The identifier does not fit in 11 bits.
    InvalidIdentifier(u16),
    /// More than 8 payload bytes were supplied for a frame.
    PayloadTooLong(usize),
    /// A frame carried fewer bytes than its message layout needs.
    PayloadTooShort { expected: usize, actual: usize },
    /// The identifier is not one of the panel messages.
    UnknownMessage(u16),
    /// A value is not a valid NodeId.
    InvalidNodeId(u8),
    /// Acceptance filter slot outside 0-15.
    InvalidFilterSlot(u8),
    /// Acceptance mask slot outside 0-2.
    InvalidMaskSlot(u8),
    /// The peripheral did not acknowledge a mode request within the wait budget.
    ModeSwitchTimeout(OperationMode),
    /// The transmit buffer did not become free within the wait budget.
    TransmitTimeout,
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier(v) => write!(f, "Identifier {v:#05x} is not a standard 11-bit identifier"),
            Self::PayloadTooLong(v) => write!(f, "Payload of {v} bytes exceeds the 8 byte CAN limit"),
            Self::PayloadTooShort { expected, actual } => {
                write!(f, "Payload too short: expected {expected} bytes, got {actual}")
            }
            Self::UnknownMessage(v) => write!(f, "Identifier {v:#05x} is not a panel message"),
            Self::InvalidNodeId(v) => write!(f, "Invalid NodeId value: {v}"),
            Self::InvalidFilterSlot(v) => write!(f, "Invalid acceptance filter slot: {v}"),
            Self::InvalidMaskSlot(v) => write!(f, "Invalid acceptance mask slot: {v}"),
            Self::ModeSwitchTimeout(m) => write!(f, "Peripheral did not enter {m:?} mode"),
            Self::TransmitTimeout => write!(f, "Transmit buffer did not become free"),
            Self::InvalidConfig(s) => write!(f, "Invalid configuration: {}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PanelError {}

// --- From Implementations for Error Conversion ---

impl From<NodeIdError> for PanelError {
    fn from(err: NodeIdError) -> Self {
        match err {
            NodeIdError::InvalidRange(val) => PanelError::InvalidNodeId(val),
        }
    }
}

impl From<FrameError> for PanelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::IdentifierOutOfRange(id) => PanelError::InvalidIdentifier(id),
            FrameError::PayloadTooLong(len) => PanelError::PayloadTooLong(len),
        }
    }
}

/// Register-level access to an ECAN-style CAN controller.
///
/// The driver owns all sequencing (configuration mode, filter window, DMA
/// buffer layout). Implementations only move values in and out of the
/// controller, so the same driver runs on silicon, on the software model in
/// `emulation` and on top of a Linux SocketCAN socket.
pub trait CanPeripheral {
    /// Writes the requested operation mode (REQOP).
    fn request_mode(&mut self, mode: OperationMode);

    /// Reads the mode the controller currently operates in (OPMODE).
    fn current_mode(&self) -> OperationMode;

    /// Aborts every pending transmission (ABAT).
    fn abort_pending(&mut self);

    /// Writes the two bit-timing configuration registers.
    fn write_bit_timing(&mut self, cfg1: u16, cfg2: u16);

    /// Marks `buffer` as a transmit (`true`) or receive buffer.
    fn configure_buffer(&mut self, buffer: u8, transmit: bool);

    /// Selects the DMA buffer count and maps the message buffers into memory.
    fn configure_dma(&mut self, buffer_count: u8);

    /// Switches the register window between control and filter registers (WIN).
    fn set_filter_window(&mut self, filter_window: bool);

    /// Points acceptance filter `filter` at message buffer `buffer`.
    fn write_buffer_pointer(&mut self, filter: u8, buffer: u8);

    /// Writes the standard identifier register of acceptance filter `slot`.
    fn write_filter(&mut self, slot: u8, value: u16);

    fn filter_enable(&self) -> u16;

    fn write_filter_enable(&mut self, bits: u16);

    /// Writes the standard identifier register of acceptance mask `slot`.
    fn write_mask(&mut self, slot: u8, value: u16);

    /// Reads mask select register `bank` (0 for filters 0-7, 1 for 8-15).
    fn mask_select(&self, bank: u8) -> u16;

    fn write_mask_select(&mut self, bank: u8, value: u16);

    fn write_interrupt_enable(&mut self, bits: u16);

    /// Clears the module interrupt flags.
    fn clear_interrupt_flags(&mut self);

    /// Receive buffer full flags, one bit per buffer.
    fn rx_full(&self) -> u16;

    fn clear_rx_full(&mut self, buffer: u8);

    /// Copies one DMA message buffer.
    fn read_buffer(&self, buffer: u8) -> BufferWords;

    fn write_buffer(&mut self, buffer: u8, words: BufferWords);

    /// True while a transmission request is outstanding on `buffer` (TXREQ).
    fn transmit_pending(&self, buffer: u8) -> bool;

    /// Sets the priority and the transmit request bit of `buffer`.
    fn request_transmit(&mut self, buffer: u8, priority: u8);
}

/// Keypad scanner. Returns the scan code `0..=15` of the pressed key.
pub trait Keypad {
    fn scan(&mut self) -> Option<u8>;
}

/// Character display.
pub trait Display {
    fn show(&mut self, text: &str);
}

/// Discrete status outputs (buzzer and LEDs).
pub trait Indicators {
    fn set(&mut self, indicator: Indicator, on: bool);
}

/// Digital inputs sampled by the input watcher.
pub trait PanelInputs {
    /// Level of the intrusion sensor.
    fn intrusion(&mut self) -> bool;
    /// Level of the change-password button.
    fn change_password(&mut self) -> bool;
}

/// Pin and clock bring-up.
pub trait Board {
    fn init(&mut self) -> Result<(), PanelError>;
}
