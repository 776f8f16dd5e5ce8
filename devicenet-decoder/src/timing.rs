//! Per-bit sample offsets
//!
//! CAN allows no resynchronisation inside the decoder's view of a frame, so
//! every bit position is computed up front from the start-of-frame edge. The
//! table accumulates `samples_per_bit` with the fractional remainder carried
//! forward, which keeps every sample point within half a sample of the ideal
//! bit centre over a full 256-bit frame.

use crate::types::{DecoderError, Result};

/// Number of entries in the bit offset table
pub const BIT_OFFSET_TABLE_LEN: usize = 256;

/// Sample timing derived from a sample rate / bit rate pair
#[derive(Debug, Clone, PartialEq)]
pub struct SampleClock {
    sample_rate_hz: u32,
    bit_rate_hz: u32,
    samples_per_bit: f64,
    start_bit_center: u64,
    offsets: Vec<u64>,
    samples_in_7_bits: u64,
}

impl SampleClock {
    /// Build the offset table for a sample rate / bit rate pair
    ///
    /// Entry 0 is the centre of the first bit after the start bit
    /// (`round(1.5 * samples_per_bit)`); each following entry adds one bit
    /// period, rounded to the nearest sample with the remainder carried over.
    pub fn new(sample_rate_hz: u32, bit_rate_hz: u32) -> Result<Self> {
        if bit_rate_hz == 0 || sample_rate_hz < bit_rate_hz {
            return Err(DecoderError::InvalidConfig(format!(
                "cannot sample {} bit/s at {} Hz",
                bit_rate_hz, sample_rate_hz
            )));
        }

        let samples_per_bit = f64::from(sample_rate_hz) / f64::from(bit_rate_hz);

        let first = (1.5 * samples_per_bit).round();
        let mut samples_behind = 1.5 * samples_per_bit - first;
        let mut current_offset = first as u64;

        let mut offsets = Vec::with_capacity(BIT_OFFSET_TABLE_LEN);
        offsets.push(current_offset);

        for _ in 1..BIT_OFFSET_TABLE_LEN {
            let exact = samples_per_bit + samples_behind;
            let increment = exact.round();
            samples_behind = exact - increment;
            current_offset += increment as u64;
            offsets.push(current_offset);
        }

        let clock = Self {
            sample_rate_hz,
            bit_rate_hz,
            samples_per_bit,
            start_bit_center: (0.5 * samples_per_bit).round() as u64,
            offsets,
            samples_in_7_bits: (samples_per_bit * 7.0).floor() as u64,
        };

        log::debug!(
            "Sample clock: {} Hz / {} bit/s = {:.3} samples per bit",
            sample_rate_hz,
            bit_rate_hz,
            samples_per_bit
        );

        Ok(clock)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn bit_rate_hz(&self) -> u32 {
        self.bit_rate_hz
    }

    /// Real-valued bit period in samples
    pub fn samples_per_bit(&self) -> f64 {
        self.samples_per_bit
    }

    /// Offset of the start bit's centre from the start-of-frame edge
    pub fn start_bit_center(&self) -> u64 {
        self.start_bit_center
    }

    /// Offset of the centre of bit `index + 1` from the start-of-frame edge
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    /// The full bit offset table
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Idle time after which the bus is considered free
    pub fn samples_in_7_bits(&self) -> u64 {
        self.samples_in_7_bits
    }
}
