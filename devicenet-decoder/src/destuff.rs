//! Bit stuffing
//!
//! Between the start of frame and the end of the CRC sequence a transmitter
//! inserts one complementary bit after every five identical bits. The
//! [`Destuffer`] walks a raw frame and hands out logical bits with the stuff
//! bits removed; [`stuff`] is its exact inverse, used by the encoder.
//!
//! Running out of raw bits is reported as `None`. Callers abort the rest of
//! the frame at that point without emitting a record for the incomplete
//! field, so partial frames produce partial output.

use crate::acquire::RawBit;
use crate::types::BusLevel;

/// Identical bits after which a stuff bit follows
pub const STUFF_RUN: u32 = 5;

/// Where a consumed raw bit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitProvenance {
    Normal,
    StuffBit,
}

/// One consumed raw bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalBit {
    pub level: BusLevel,
    pub sample: u64,
    pub provenance: BitProvenance,
}

/// Frame-scoped cursor over a raw frame
#[derive(Debug)]
pub struct Destuffer<'a> {
    raw: &'a [RawBit],
    index: usize,
    dominant_count: u32,
    recessive_count: u32,
    trail: Vec<LogicalBit>,
}

impl<'a> Destuffer<'a> {
    pub fn new(raw: &'a [RawBit]) -> Self {
        Self {
            raw,
            index: 0,
            dominant_count: 0,
            recessive_count: 0,
            trail: Vec::with_capacity(raw.len()),
        }
    }

    /// Next logical bit of the stuffed region
    ///
    /// `reset` clears the run counters and rewinds to the first raw bit; it is
    /// passed exactly once per frame, when consuming the start bit.
    pub fn next_stuffed_bit(&mut self, reset: bool) -> Option<LogicalBit> {
        if reset {
            self.dominant_count = 0;
            self.recessive_count = 0;
            self.index = 0;
            self.trail.clear();
        }

        if self.recessive_count == STUFF_RUN {
            self.skip_stuff_bit()?;
            self.recessive_count = 0;
            // the stuff bit is dominant and starts the next run
            self.dominant_count = 1;
        } else if self.dominant_count == STUFF_RUN {
            self.skip_stuff_bit()?;
            self.dominant_count = 0;
            self.recessive_count = 1;
        }

        let raw = *self.raw.get(self.index)?;
        match raw.level {
            BusLevel::Recessive => {
                self.recessive_count += 1;
                self.dominant_count = 0;
            }
            BusLevel::Dominant => {
                self.dominant_count += 1;
                self.recessive_count = 0;
            }
        }

        Some(self.consume(raw, BitProvenance::Normal))
    }

    /// Next bit of the fixed-form region (ACK field, end of frame)
    pub fn next_fixed_form_bit(&mut self) -> Option<LogicalBit> {
        let raw = *self.raw.get(self.index)?;
        Some(self.consume(raw, BitProvenance::Normal))
    }

    /// Every raw bit consumed so far, stuff bits included
    pub fn trail(&self) -> &[LogicalBit] {
        &self.trail
    }

    pub fn into_trail(self) -> Vec<LogicalBit> {
        self.trail
    }

    fn skip_stuff_bit(&mut self) -> Option<()> {
        let raw = *self.raw.get(self.index)?;
        self.consume(raw, BitProvenance::StuffBit);
        Some(())
    }

    fn consume(&mut self, raw: RawBit, provenance: BitProvenance) -> LogicalBit {
        let bit = LogicalBit {
            level: raw.level,
            sample: raw.sample,
            provenance,
        };
        self.trail.push(bit);
        self.index += 1;
        bit
    }
}

/// Insert a complementary bit after every run of five identical bits
pub fn stuff(bits: &[BusLevel]) -> Vec<BusLevel> {
    let mut stuffed = Vec::with_capacity(bits.len() + bits.len() / 4);
    let mut run_level = None;
    let mut run = 0;

    for &bit in bits {
        stuffed.push(bit);
        if run_level == Some(bit) {
            run += 1;
        } else {
            run_level = Some(bit);
            run = 1;
        }

        if run == STUFF_RUN {
            let stuff_bit = bit.complement();
            stuffed.push(stuff_bit);
            run_level = Some(stuff_bit);
            run = 1;
        }
    }

    stuffed
}

/// Remove stuff bits from a stuffed bitstream
pub fn destuff(bits: &[BusLevel]) -> Vec<BusLevel> {
    let raw: Vec<RawBit> = bits
        .iter()
        .enumerate()
        .map(|(i, &level)| RawBit {
            level,
            sample: i as u64,
        })
        .collect();

    let mut destuffer = Destuffer::new(&raw);
    let mut logical = Vec::with_capacity(raw.len());
    let mut reset = true;
    while let Some(bit) = destuffer.next_stuffed_bit(reset) {
        reset = false;
        logical.push(bit.level);
    }
    logical
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pattern: &str) -> Vec<BusLevel> {
        pattern
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| BusLevel::from_bit(c == '1'))
            .collect()
    }

    /// Number of stuff bits the stuffing rule requires for `bits`
    fn expected_stuff_count(bits: &[BusLevel]) -> usize {
        let mut count = 0;
        let mut previous = None;
        let mut run = 0;
        for &bit in bits {
            if previous == Some(bit) {
                run += 1;
            } else {
                previous = Some(bit);
                run = 1;
            }
            if run == 5 {
                count += 1;
                // the inserted complement starts a new run
                previous = Some(bit.complement());
                run = 1;
            }
        }
        count
    }

    #[test]
    fn test_stuff_inserts_complement() {
        assert_eq!(stuff(&parse("00000")), parse("00000 1"));
        assert_eq!(stuff(&parse("0000 1111")), parse("0000 1111"));
        assert_eq!(stuff(&parse("11111 0000")), parse("11111 0 0000 1"));
        // the stuff bit counts towards the next run
        assert_eq!(stuff(&parse("00000 1111 0")), parse("00000 1 1111 0 0"));
    }

    #[test]
    fn test_destuff_inverts_stuff() {
        let patterns = [
            "",
            "0",
            "00000",
            "0000011111",
            "0 01100111000 000 1000 0000000000000000 101010101",
            "1111111111111111111111111111111",
            "000001111100000111110000011111",
        ];
        for pattern in patterns {
            let bits = parse(pattern);
            let stuffed = stuff(&bits);
            assert_eq!(destuff(&stuffed), bits, "pattern {:?}", pattern);
            assert_eq!(stuffed.len() - bits.len(), expected_stuff_count(&bits));
        }
    }

    #[test]
    fn test_destuffer_marks_stuff_bits() {
        let stuffed = stuff(&parse("0 00001 1"));
        let raw: Vec<RawBit> = stuffed
            .iter()
            .enumerate()
            .map(|(i, &level)| RawBit {
                level,
                sample: 100 + i as u64,
            })
            .collect();

        let mut destuffer = Destuffer::new(&raw);
        let mut data = Vec::new();
        let mut reset = true;
        while let Some(bit) = destuffer.next_stuffed_bit(reset) {
            reset = false;
            data.push(bit.sample);
        }

        assert_eq!(data, vec![100, 101, 102, 103, 104, 106, 107]);
        let stuff_samples: Vec<u64> = destuffer
            .trail()
            .iter()
            .filter(|b| b.provenance == BitProvenance::StuffBit)
            .map(|b| b.sample)
            .collect();
        assert_eq!(stuff_samples, vec![105]);
    }

    #[test]
    fn test_exhaustion_after_pending_stuff_bit() {
        // five identical bits with the stuff bit missing from the capture
        let raw: Vec<RawBit> = parse("11111")
            .into_iter()
            .enumerate()
            .map(|(i, level)| RawBit {
                level,
                sample: i as u64,
            })
            .collect();
        let mut destuffer = Destuffer::new(&raw);
        assert!(destuffer.next_stuffed_bit(true).is_some());
        for _ in 0..4 {
            assert!(destuffer.next_stuffed_bit(false).is_some());
        }
        assert!(destuffer.next_stuffed_bit(false).is_none());
        assert!(destuffer.next_fixed_form_bit().is_none());
    }

    #[test]
    fn test_fixed_form_bits_are_not_destuffed() {
        let raw: Vec<RawBit> = parse("000001")
            .into_iter()
            .enumerate()
            .map(|(i, level)| RawBit {
                level,
                sample: i as u64,
            })
            .collect();
        let mut destuffer = Destuffer::new(&raw);
        let mut levels = Vec::new();
        while let Some(bit) = destuffer.next_fixed_form_bit() {
            levels.push(bit.level);
        }
        assert_eq!(levels, parse("000001"));
    }
}
