//! A collection of utilities.

/// Returns the slot, 0 or 1, associated to a logical clock value.
#[inline(always)]
pub(crate) const fn parity(clock: u32) -> usize { (clock % 2) as usize }

/// Reads a little-endian `u16` at `offset`.
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Writes a little-endian `u16` at `offset`.
pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian `u32` at `offset`.
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

/// Writes a little-endian `u32` at `offset`.
pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn parity_alternates() {
    assert_eq!(0, parity(0));
    assert_eq!(1, parity(1));
    assert_eq!(0, parity(2));
    assert_eq!(1, parity(u32::MAX));
}

#[test]
fn little_endian_fields() {
    let mut bytes = [0u8; 8];

    write_u16(&mut bytes, 1, 0xBEEF);
    write_u32(&mut bytes, 3, 0x1234_5678);

    assert_eq!([0x00, 0xEF, 0xBE, 0x78, 0x56, 0x34, 0x12, 0x00], bytes);
    assert_eq!(0xBEEF, read_u16(&bytes, 1));
    assert_eq!(0x1234_5678, read_u32(&bytes, 3));
}

} // mod tests
