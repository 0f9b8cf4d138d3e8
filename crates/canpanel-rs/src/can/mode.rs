/// Controller operation modes, encoded as the 3-bit REQOP/OPMODE field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OperationMode {
    #[default]
    Normal = 0,
    Disable = 1,
    Loopback = 2,
    ListenOnly = 3,
    Configuration = 4,
    ListenAll = 7,
}

impl OperationMode {
    /// Decodes the register field. Reserved encodings (5, 6) yield `None`.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b111 {
            0 => Some(Self::Normal),
            1 => Some(Self::Disable),
            2 => Some(Self::Loopback),
            3 => Some(Self::ListenOnly),
            4 => Some(Self::Configuration),
            7 => Some(Self::ListenAll),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Whether frames are put on the wire in this mode.
    pub const fn can_transmit(self) -> bool {
        matches!(self, Self::Normal | Self::Loopback)
    }

    /// Whether frames from the wire reach the receive buffers.
    pub const fn can_receive(self) -> bool {
        matches!(self, Self::Normal | Self::ListenOnly | Self::ListenAll)
    }
}
