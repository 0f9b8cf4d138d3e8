//! Nominal bit timing for a 20 time-quantum bit.
//!
//! The bit is split into sync (1), propagation (5), phase 1 (8) and
//! phase 2 (6) segments with a synchronization jump width of 4. Only the
//! prescaler changes with the baud rate.

/// Reference clock feeding the CAN module.
pub const FCAN_HZ: u32 = 40_000_000;

/// Time quanta per bit.
pub const NTQ: u32 = 20;

pub const SYNC_SEG: u8 = 1;
pub const PROP_SEG: u8 = 5;
pub const PHASE_SEG1: u8 = 8;
pub const PHASE_SEG2: u8 = 6;
pub const SJW: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baudrate {
    Kbps125,
    Kbps250,
    #[default]
    Kbps500,
    Mbps1,
}

impl Baudrate {
    pub const fn bits_per_second(self) -> u32 {
        match self {
            Self::Kbps125 => 125_000,
            Self::Kbps250 => 250_000,
            Self::Kbps500 => 500_000,
            Self::Mbps1 => 1_000_000,
        }
    }

    pub const fn from_bits_per_second(bps: u32) -> Option<Self> {
        match bps {
            125_000 => Some(Self::Kbps125),
            250_000 => Some(Self::Kbps250),
            500_000 => Some(Self::Kbps500),
            1_000_000 => Some(Self::Mbps1),
            _ => None,
        }
    }
}

/// Register-ready bit timing for one baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    /// Baud rate prescaler (BRP), `FCAN / (2 * NTQ * baud) - 1`.
    pub prescaler: u8,
    pub prop_seg: u8,
    pub phase_seg1: u8,
    pub phase_seg2: u8,
    pub sjw: u8,
    /// Sample the bus three times at the sample point.
    pub triple_sample: bool,
}

impl BitTiming {
    pub const fn for_baudrate(baudrate: Baudrate) -> Self {
        Self {
            prescaler: (FCAN_HZ / (2 * NTQ * baudrate.bits_per_second()) - 1) as u8,
            prop_seg: PROP_SEG,
            phase_seg1: PHASE_SEG1,
            phase_seg2: PHASE_SEG2,
            sjw: SJW,
            triple_sample: true,
        }
    }

    pub const fn quanta_per_bit(&self) -> u32 {
        (SYNC_SEG + self.prop_seg + self.phase_seg1 + self.phase_seg2) as u32
    }

    /// Bit rate produced from `fcan` with these settings.
    pub const fn bit_rate(&self, fcan: u32) -> u32 {
        fcan / (2 * (self.prescaler as u32 + 1) * self.quanta_per_bit())
    }

    /// CiCFG1: `SJW-1` in bits 7:6, `BRP` in bits 5:0.
    pub const fn cfg1(&self) -> u16 {
        (((self.sjw - 1) as u16) << 6) | (self.prescaler as u16 & 0x3F)
    }

    /// CiCFG2: phase 2 in bits 10:8, freely programmable phase 2 (bit 7),
    /// triple sampling (bit 6), phase 1 in bits 5:3, propagation in bits 2:0.
    pub const fn cfg2(&self) -> u16 {
        let sam = if self.triple_sample { 1 << 6 } else { 0 };
        (((self.phase_seg2 - 1) as u16) << 8)
            | (1 << 7)
            | sam
            | (((self.phase_seg1 - 1) as u16) << 3)
            | ((self.prop_seg - 1) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prescalers_match_the_reference_clock() {
        assert_eq!(BitTiming::for_baudrate(Baudrate::Mbps1).prescaler, 0);
        assert_eq!(BitTiming::for_baudrate(Baudrate::Kbps500).prescaler, 1);
        assert_eq!(BitTiming::for_baudrate(Baudrate::Kbps250).prescaler, 3);
        assert_eq!(BitTiming::for_baudrate(Baudrate::Kbps125).prescaler, 7);
    }

    #[test]
    fn every_baudrate_round_trips_through_the_timing() {
        for baud in [Baudrate::Kbps125, Baudrate::Kbps250, Baudrate::Kbps500, Baudrate::Mbps1] {
            let timing = BitTiming::for_baudrate(baud);
            assert_eq!(timing.quanta_per_bit(), NTQ);
            assert_eq!(timing.bit_rate(FCAN_HZ), baud.bits_per_second());
        }
    }

    #[test]
    fn register_values() {
        let timing = BitTiming::for_baudrate(Baudrate::Kbps500);
        assert_eq!(timing.cfg1(), 0b11_000001);
        // phase2=5, SEG2PHTS, SAM, phase1=7, prop=4
        assert_eq!(timing.cfg2(), (5 << 8) | (1 << 7) | (1 << 6) | (7 << 3) | 4);
    }
}
