use core::convert::TryFrom;
use core::fmt;

// --- Panel Network Constants ---

/// Number of panel slots on one bus. Valid node ids are `0..MAX_NODES`.
pub const MAX_NODES: usize = 10;

/// Default base offset added to every message code to form the CAN identifier.
pub const DEFAULT_ID_OFFSET: u16 = 0x200;

/// Highest standard (11-bit) CAN identifier.
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Payload byte used as sender id before the local node has claimed a slot.
pub const UNASSIGNED_NODE_ID: u8 = 0xFF;

/// Length of a keypad code.
pub const PASSWORD_LEN: usize = 4;

/// Factory password set at boot.
pub const DEFAULT_PASSWORD: Password = Password(*b"B169");

// --- Timing Constants ---

/// Liveness tick period (100 ms).
pub const TICK_PERIOD_MS: u32 = 100;

/// Missed ticks after which a silent peer raises the alarm (5 s).
pub const LIVENESS_TIMEOUT_TICKS: u16 = 50;

/// Ticks spent listening before claiming a node id (5 s).
pub const BOOTSTRAP_TICKS: u16 = 50;

/// Period of the heartbeat broadcast.
pub const HEARTBEAT_PERIOD_MS: u32 = 5_000;

/// Grace period between an intrusion and the alarm.
pub const INTRUSION_COUNTDOWN_MS: u32 = 30_000;

/// How long the password task waits for a code before looping.
pub const PASSWORD_TIMEOUT_MS: u32 = 5_000;

/// Identifies one panel on the bus, wrapping a `u8` in `0..MAX_NODES`.
///
/// A node owns exactly one id once it has bootstrapped; ids of peers are only
/// ever referenced when tracking their heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u8);

impl NodeId {
    /// Index of this node in per-node tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Error type for invalid Node ID creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIdError {
    /// Node ID is outside `0..MAX_NODES`.
    InvalidRange(u8),
}

impl fmt::Display for NodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeIdError::InvalidRange(value) => {
                write!(f, "Invalid NodeId value: {}. Valid range is 0-{}.", value, MAX_NODES - 1)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for NodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (value as usize) < MAX_NODES {
            Ok(NodeId(value))
        } else {
            Err(NodeIdError::InvalidRange(value))
        }
    }
}

impl From<NodeId> for u8 {
    fn from(node_id: NodeId) -> Self {
        node_id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic panel messages. The discriminant is the code added to the
/// identifier offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Heartbeat = 0,
    Intrusion = 1,
    Disarm = 2,
    Arm = 4,
    AlarmStarted = 8,
    NewPassword = 24,
}

/// Error for a code that is not a known `MessageType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMessageTypeError(pub u16);

impl TryFrom<u16> for MessageType {
    type Error = InvalidMessageTypeError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageType::Heartbeat),
            1 => Ok(MessageType::Intrusion),
            2 => Ok(MessageType::Disarm),
            4 => Ok(MessageType::Arm),
            8 => Ok(MessageType::AlarmStarted),
            24 => Ok(MessageType::NewPassword),
            _ => Err(InvalidMessageTypeError(code)),
        }
    }
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::Heartbeat,
        MessageType::Intrusion,
        MessageType::Disarm,
        MessageType::Arm,
        MessageType::AlarmStarted,
        MessageType::NewPassword,
    ];

    /// The CAN identifier of this message for a given offset.
    pub const fn identifier(self, offset: u16) -> u16 {
        offset + self as u16
    }

    /// Reverse lookup. The identifier must match a message exactly.
    pub fn from_identifier(identifier: u16, offset: u16) -> Option<Self> {
        identifier
            .checked_sub(offset)
            .and_then(|code| MessageType::try_from(code).ok())
    }

    /// Number of payload bytes carried by this message.
    pub const fn payload_len(self) -> usize {
        match self {
            MessageType::NewPassword => 1 + PASSWORD_LEN,
            _ => 1,
        }
    }
}

/// A 4-character keypad code.
///
/// `Debug` never prints the characters so codes cannot leak into logs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Password(pub [u8; PASSWORD_LEN]);

impl Password {
    /// Builds a password from exactly four bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Password)
    }

    pub const fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl Default for Password {
    fn default() -> Self {
        DEFAULT_PASSWORD
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

/// Status outputs driven by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// Alarm sounder.
    Buzzer,
    /// Lit while the panel is armed.
    LockStatus,
    /// Lit while the intrusion countdown runs.
    TimerStatus,
    /// Toggled on every heartbeat broadcast.
    Heartbeat,
    /// Toggled on every heartbeat received from a peer.
    BusActivity,
}
