use crate::can::CanFrame;
use crate::hal::PanelError;
use crate::types::{MessageType, PASSWORD_LEN, Password};

/// A trait for objects that can be carried in a single CAN frame.
pub trait Codec: Sized {
    /// Builds the frame for this object with identifiers based at `offset`.
    fn encode(&self, offset: u16) -> Result<CanFrame, PanelError>;

    /// Parses an object from a received frame.
    fn decode(frame: &CanFrame, offset: u16) -> Result<Self, PanelError>;
}

/// The six panel messages with their payloads.
///
/// Sender ids are raw bytes: a peer may announce itself before it owns a
/// valid slot, and the dispatcher decides what to do with out-of-range ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelMessage {
    Heartbeat { node: u8 },
    Intrusion { node: u8 },
    Disarm { node: u8 },
    Arm { node: u8 },
    AlarmStarted { node: u8 },
    NewPassword { node: u8, password: Password },
}

impl PanelMessage {
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Heartbeat { .. } => MessageType::Heartbeat,
            Self::Intrusion { .. } => MessageType::Intrusion,
            Self::Disarm { .. } => MessageType::Disarm,
            Self::Arm { .. } => MessageType::Arm,
            Self::AlarmStarted { .. } => MessageType::AlarmStarted,
            Self::NewPassword { .. } => MessageType::NewPassword,
        }
    }

    /// Sender id carried in payload byte 0.
    pub const fn node(&self) -> u8 {
        match *self {
            Self::Heartbeat { node }
            | Self::Intrusion { node }
            | Self::Disarm { node }
            | Self::Arm { node }
            | Self::AlarmStarted { node }
            | Self::NewPassword { node, .. } => node,
        }
    }
}

/// Splits a frame into its message type and raw payload.
///
/// The identifier must equal one of the message identifiers exactly.
pub fn decode_frame(frame: &CanFrame, offset: u16) -> Result<(MessageType, &[u8]), PanelError> {
    let message_type = MessageType::from_identifier(frame.id(), offset)
        .ok_or(PanelError::UnknownMessage(frame.id()))?;
    let expected = message_type.payload_len();
    if frame.len() < expected {
        return Err(PanelError::PayloadTooShort {
            expected,
            actual: frame.len(),
        });
    }
    Ok((message_type, frame.payload()))
}

impl Codec for PanelMessage {
    fn encode(&self, offset: u16) -> Result<CanFrame, PanelError> {
        let id = self.message_type().identifier(offset);
        match self {
            Self::NewPassword { node, password } => {
                let mut payload = [0u8; 1 + PASSWORD_LEN];
                payload[0] = *node;
                payload[1..].copy_from_slice(password.as_bytes());
                Ok(CanFrame::new(id, &payload)?)
            }
            _ => Ok(CanFrame::new(id, &[self.node()])?),
        }
    }

    fn decode(frame: &CanFrame, offset: u16) -> Result<Self, PanelError> {
        let (message_type, payload) = decode_frame(frame, offset)?;
        let node = payload[0];
        Ok(match message_type {
            MessageType::Heartbeat => Self::Heartbeat { node },
            MessageType::Intrusion => Self::Intrusion { node },
            MessageType::Disarm => Self::Disarm { node },
            MessageType::Arm => Self::Arm { node },
            MessageType::AlarmStarted => Self::AlarmStarted { node },
            MessageType::NewPassword => {
                let password = Password::from_bytes(&payload[1..1 + PASSWORD_LEN]).ok_or(
                    PanelError::PayloadTooShort {
                        expected: 1 + PASSWORD_LEN,
                        actual: payload.len(),
                    },
                )?;
                Self::NewPassword { node, password }
            }
        })
    }
}

/// Encodes and decodes panel messages for one identifier offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCodec {
    pub offset: u16,
}

impl MessageCodec {
    pub const fn new(offset: u16) -> Self {
        Self { offset }
    }

    pub fn encode(&self, message: &PanelMessage) -> Result<CanFrame, PanelError> {
        message.encode(self.offset)
    }

    pub fn decode(&self, frame: &CanFrame) -> Result<PanelMessage, PanelError> {
        PanelMessage::decode(frame, self.offset)
    }
}
