use crate::types::MAX_STANDARD_ID;
use core::fmt;

/// Maximum payload of a classic CAN frame.
pub const MAX_PAYLOAD: usize = 8;

/// A standard-identifier CAN data frame.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: u16,
    len: u8,
    data: [u8; MAX_PAYLOAD],
}

/// Reasons a frame cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    IdentifierOutOfRange(u16),
    PayloadTooLong(usize),
}

impl CanFrame {
    pub fn new(id: u16, payload: &[u8]) -> Result<Self, FrameError> {
        if id > MAX_STANDARD_ID {
            return Err(FrameError::IdentifierOutOfRange(id));
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
        })
    }

    pub const fn id(&self) -> u16 {
        self.id
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Debug for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanFrame({:#05x} [{}] {:02X?})", self.id, self.len, self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_extended_identifiers_and_long_payloads() {
        assert_eq!(CanFrame::new(0x800, &[]), Err(FrameError::IdentifierOutOfRange(0x800)));
        assert_eq!(CanFrame::new(0x200, &[0; 9]), Err(FrameError::PayloadTooLong(9)));
    }

    #[test]
    fn payload_is_trimmed_to_length() {
        let frame = CanFrame::new(0x218, &[3, b'A', b'B', b'C', b'D']).unwrap();
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.payload(), &[3, b'A', b'B', b'C', b'D']);
    }
}
