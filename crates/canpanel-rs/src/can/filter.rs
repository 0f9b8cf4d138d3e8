//! Acceptance filter and mask register encodings.

use crate::hal::PanelError;
use crate::types::MAX_STANDARD_ID;

pub const FILTER_SLOTS: u8 = 16;
pub const MASK_SLOTS: u8 = 3;

/// "Match only message types selected by EXIDE" bit of a mask register.
pub const MIDE: u16 = 0x0008;

/// Filters per mask select register.
const FILTERS_PER_BANK: u8 = 8;

pub fn check_filter_slot(slot: u8) -> Result<(), PanelError> {
    if slot < FILTER_SLOTS { Ok(()) } else { Err(PanelError::InvalidFilterSlot(slot)) }
}

pub fn check_mask_slot(slot: u8) -> Result<(), PanelError> {
    if slot < MASK_SLOTS { Ok(()) } else { Err(PanelError::InvalidMaskSlot(slot)) }
}

/// Standard identifier as stored in a filter SID register.
pub const fn filter_register(identifier: u16) -> u16 {
    (identifier & MAX_STANDARD_ID) << 5
}

pub const fn mask_register(mask: u16) -> u16 {
    ((mask & MAX_STANDARD_ID) << 5) | MIDE
}

/// Recovers the 11-bit identifier (or mask) from a SID register value.
pub const fn sid_of(register: u16) -> u16 {
    (register >> 5) & MAX_STANDARD_ID
}

/// Mask select bank and bit shift of `filter`.
pub const fn mask_select_position(filter: u8) -> (u8, u16) {
    (filter / FILTERS_PER_BANK, ((filter % FILTERS_PER_BANK) as u16) * 2)
}

/// Returns `register` with the 2-bit field of `filter` set to `mask_slot`.
pub const fn with_mask_selected(register: u16, filter: u8, mask_slot: u8) -> u16 {
    let (_, shift) = mask_select_position(filter);
    (register & !(0b11 << shift)) | (((mask_slot & 0b11) as u16) << shift)
}

/// Mask slot currently selected for `filter` in `register`.
pub const fn selected_mask(register: u16, filter: u8) -> u8 {
    let (_, shift) = mask_select_position(filter);
    ((register >> shift) & 0b11) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_encoding() {
        assert_eq!(filter_register(0x099), 0x099 << 5);
        assert_eq!(sid_of(filter_register(0x7FF)), 0x7FF);
        assert_eq!(mask_register(0x7FF), (0x7FF << 5) | 0x8);
    }

    #[test]
    fn mask_select_fields_are_independent() {
        let reg = with_mask_selected(0, 3, 2);
        let reg = with_mask_selected(reg, 4, 1);
        assert_eq!(selected_mask(reg, 3), 2);
        assert_eq!(selected_mask(reg, 4), 1);
        assert_eq!(selected_mask(reg, 0), 0);
        let reg = with_mask_selected(reg, 3, 0);
        assert_eq!(selected_mask(reg, 3), 0);
        assert_eq!(selected_mask(reg, 4), 1);
    }

    #[test]
    fn filters_above_seven_use_the_second_bank() {
        assert_eq!(mask_select_position(7), (0, 14));
        assert_eq!(mask_select_position(8), (1, 0));
        assert_eq!(mask_select_position(15), (1, 14));
    }

    #[test]
    fn slot_bounds() {
        assert!(check_filter_slot(15).is_ok());
        assert_eq!(check_filter_slot(16), Err(PanelError::InvalidFilterSlot(16)));
        assert!(check_mask_slot(2).is_ok());
        assert_eq!(check_mask_slot(3), Err(PanelError::InvalidMaskSlot(3)));
    }
}
