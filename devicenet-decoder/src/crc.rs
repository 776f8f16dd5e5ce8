//! CAN CRC-15
//!
//! Generator polynomial x^15 + x^14 + x^10 + x^8 + x^7 + x^4 + x^3 + 1
//! (0x4599), computed over the destuffed start bit, arbitration, control and
//! data fields in transmission order. The register starts at zero and there
//! is no final XOR.

use crate::types::BusLevel;

/// Generator polynomial without the x^15 term
pub const CRC15_POLYNOMIAL: u16 = 0x4599;

/// Number of bits in the CRC sequence
pub const CRC15_BITS: u32 = 15;

const CRC15_MASK: u16 = 0x7FFF;
const CRC15_MSB: u16 = 0x4000;

/// 15-bit CRC shift register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc15 {
    register: u16,
}

impl Crc15 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift one bit into the register
    pub fn update(&mut self, bit: BusLevel) {
        let feedback = (self.register & CRC15_MSB != 0) ^ bit.as_bit();
        self.register = (self.register << 1) & CRC15_MASK;
        if feedback {
            self.register ^= CRC15_POLYNOMIAL;
        }
    }

    /// Current CRC value
    pub fn value(&self) -> u16 {
        self.register
    }
}

/// CRC-15 of a destuffed bit sequence
pub fn compute(bits: &[BusLevel]) -> u16 {
    let mut crc = Crc15::new();
    for &bit in bits {
        crc.update(bit);
    }
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(value: u32, width: u32) -> Vec<BusLevel> {
        (0..width)
            .rev()
            .map(|i| BusLevel::from_bit(value & (1 << i) != 0))
            .collect()
    }

    #[test]
    fn test_single_bits() {
        assert_eq!(compute(&[]), 0);
        assert_eq!(compute(&[BusLevel::Dominant]), 0);
        assert_eq!(compute(&[BusLevel::Recessive]), 0x4599);
        assert_eq!(compute(&[BusLevel::Recessive, BusLevel::Dominant]), 0x4EAB);
    }

    #[test]
    fn test_leading_dominant_bits_do_not_change_crc() {
        let payload = levels(0x2A5, 11);
        let mut padded = vec![BusLevel::Dominant; 4];
        padded.extend(&payload);
        assert_eq!(compute(&payload), compute(&padded));
    }

    #[test]
    fn test_message_followed_by_crc_leaves_zero_remainder() {
        for (value, width) in [(0x338u32, 11), (0x1234_5678, 32), (0x7FF, 11), (0x1, 19)] {
            let mut bits = levels(value, width);
            let crc = compute(&bits);
            assert!(crc <= 0x7FFF);
            bits.extend(levels(u32::from(crc), CRC15_BITS));
            assert_eq!(compute(&bits), 0, "value 0x{:X}", value);
        }
    }

    #[test]
    fn test_single_bit_errors_are_detected() {
        let bits = levels(0x0C38_0807, 32);
        let reference = compute(&bits);
        for i in 0..bits.len() {
            let mut corrupted = bits.clone();
            corrupted[i] = corrupted[i].complement();
            assert_ne!(compute(&corrupted), reference);
        }
    }
}
