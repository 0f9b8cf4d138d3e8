//! DMA message buffer layout.
//!
//! Each buffer is eight 16-bit words:
//!
//! | word | contents                                   |
//! |------|--------------------------------------------|
//! | 0    | `SID << 2 \| SRR << 1 \| IDE`              |
//! | 1    | extended identifier high bits (unused)     |
//! | 2    | `EID << 10 \| RTR << 9 \| RB1 << 8 \| RB0 << 4 \| DLC` |
//! | 3-6  | data bytes, little endian                  |
//! | 7    | `FILHIT << 8` (receive only)               |

use super::frame::{CanFrame, FrameError, MAX_PAYLOAD};
use crate::types::MAX_STANDARD_ID;

pub type BufferWords = [u16; 8];

/// Receive buffers 0-6.
pub const RX_BUFFERS: u8 = 7;

/// Buffer 7 is the only transmit buffer.
pub const TX_BUFFER: u8 = 7;

/// Total buffers mapped into DMA memory.
pub const DMA_BUFFERS: u8 = 8;

const IDE: u16 = 0x0001;
const DLC_MASK: u16 = 0x000F;

/// Fills a transmit buffer for a standard data frame.
pub fn encode(frame: &CanFrame) -> BufferWords {
    let mut words = [0u16; 8];
    words[0] = frame.id() << 2;
    words[2] = frame.len() as u16 & DLC_MASK;
    for (i, byte) in frame.payload().iter().enumerate() {
        words[3 + i / 2] |= (*byte as u16) << ((i % 2) * 8);
    }
    words
}

/// Extracts the frame from a receive buffer.
///
/// Extended frames are not expected behind the standard-identifier filters
/// and are returned as the standard part of their identifier. DLC values above
/// 8 mean 8 data bytes.
pub fn decode(words: &BufferWords) -> Result<CanFrame, FrameError> {
    let id = (words[0] >> 2) & MAX_STANDARD_ID;
    let dlc = ((words[2] & DLC_MASK) as usize).min(MAX_PAYLOAD);
    let mut data = [0u8; MAX_PAYLOAD];
    for (i, byte) in data.iter_mut().enumerate().take(dlc) {
        *byte = (words[3 + i / 2] >> ((i % 2) * 8)) as u8;
    }
    CanFrame::new(id, &data[..dlc])
}

/// Whether the buffer holds an extended-identifier frame.
pub fn is_extended(words: &BufferWords) -> bool {
    words[0] & IDE != 0
}

/// Index of the acceptance filter that stored this buffer.
pub fn filter_hit(words: &BufferWords) -> u8 {
    ((words[7] >> 8) & 0x1F) as u8
}

pub fn set_filter_hit(words: &mut BufferWords, filter: u8) {
    words[7] = ((filter & 0x1F) as u16) << 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_layout() {
        let frame = CanFrame::new(0x218, &[5, b'B', b'1', b'6', b'9']).unwrap();
        let words = encode(&frame);
        assert_eq!(words[0], 0x218 << 2);
        assert_eq!(words[2], 5);
        assert_eq!(words[3], u16::from_le_bytes([5, b'B']));
        assert_eq!(words[4], u16::from_le_bytes([b'1', b'6']));
        assert_eq!(words[5], u16::from_le_bytes([b'9', 0]));
        assert_eq!(words[6], 0);
    }

    #[test]
    fn receive_clamps_dlc_and_reads_filter_hit() {
        let mut words = encode(&CanFrame::new(0x200, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap());
        words[2] = 0x000F;
        set_filter_hit(&mut words, 3);
        let frame = decode(&words).unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(filter_hit(&words), 3);
        assert!(!is_extended(&words));
    }
}
