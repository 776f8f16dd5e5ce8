//! Frame acquisition
//!
//! Finds the start of a frame on the bus and captures its raw, still stuffed,
//! bitstream by sampling at the precomputed bit centres of a [`SampleClock`].

use crate::channel::SampledChannel;
use crate::config::DecoderConfig;
use crate::timing::SampleClock;
use crate::types::{BusLevel, DecoderError, Result};

/// Consecutive dominant bits that can only be an error flag
pub const STUFF_ERROR_RUN: usize = 6;

/// Consecutive recessive bits that end a frame
pub const END_OF_FRAME_RUN: usize = 7;

/// One sampled bit of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBit {
    pub level: BusLevel,
    /// Absolute sample the level was read at
    pub sample: u64,
}

/// How a raw capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Seven consecutive recessive bits were seen
    Complete,
    /// Six consecutive dominant bits were seen; they are not part of the frame
    StuffError { start_sample: u64, end_sample: u64 },
    /// Neither condition occurred within the offset table; garbage on the bus
    Abandoned,
}

/// Raw bitstream of one frame attempt, start bit first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Sample of the start-of-frame falling edge
    pub start_sample: u64,
    pub bits: Vec<RawBit>,
    pub termination: Termination,
}

/// Locates frames and captures their raw bits
pub struct FrameAcquirer<'a> {
    clock: &'a SampleClock,
    config: &'a DecoderConfig,
}

impl<'a> FrameAcquirer<'a> {
    pub fn new(clock: &'a SampleClock, config: &'a DecoderConfig) -> Self {
        Self { clock, config }
    }

    /// Wait until the bus has been recessive for at least seven bit times
    ///
    /// A partially observed frame is skipped. On return the channel sits on
    /// a recessive level, and the next edge is a start-of-frame candidate.
    pub fn wait_for_idle<C: SampledChannel>(&self, channel: &mut C) -> Result<()> {
        if self.config.is_dominant(channel.current_state()) {
            channel.advance_to_next_edge()?;
        }

        loop {
            if !channel.would_advancing_cause_transition(self.clock.samples_in_7_bits()) {
                return Ok(());
            }

            channel.advance_to_next_edge()?;
            channel.advance_to_next_edge()?;
        }
    }

    /// Capture the raw bits of a frame starting at the current position
    ///
    /// The channel must sit on the dominant falling edge of a start bit;
    /// anything else is a caller error.
    pub fn capture_raw_frame<C: SampledChannel>(&self, channel: &mut C) -> Result<RawFrame> {
        let start_sample = channel.sample_number();
        if !self.config.is_dominant(channel.current_state()) {
            return Err(DecoderError::NotAtStartOfFrame {
                sample: start_sample,
            });
        }

        let mut bits: Vec<RawBit> = Vec::with_capacity(self.clock.offsets().len() + 1);
        let mut dominant_count = 0;
        let mut recessive_count = 0;

        let sample_points = std::iter::once(self.clock.start_bit_center())
            .chain(self.clock.offsets().iter().copied());

        for offset in sample_points {
            let sample = start_sample + offset;
            channel.advance_to_abs_position(sample)?;
            let level = self.config.bus_level(channel.current_state());
            bits.push(RawBit { level, sample });

            match level {
                BusLevel::Dominant => {
                    dominant_count += 1;
                    recessive_count = 0;

                    if dominant_count == STUFF_ERROR_RUN {
                        // The error flag is not frame data
                        let error_start = bits.len() - STUFF_ERROR_RUN;
                        let start = bits[error_start].sample;
                        bits.truncate(error_start);

                        log::warn!(
                            "Bit stuffing error at samples {}..{} ({} raw bits kept)",
                            start,
                            sample,
                            bits.len()
                        );

                        return Ok(RawFrame {
                            start_sample,
                            bits,
                            termination: Termination::StuffError {
                                start_sample: start,
                                end_sample: sample,
                            },
                        });
                    }
                }
                BusLevel::Recessive => {
                    recessive_count += 1;
                    dominant_count = 0;

                    if recessive_count == END_OF_FRAME_RUN {
                        log::trace!(
                            "Captured {} raw bits starting at sample {}",
                            bits.len(),
                            start_sample
                        );
                        return Ok(RawFrame {
                            start_sample,
                            bits,
                            termination: Termination::Complete,
                        });
                    }
                }
            }
        }

        log::debug!(
            "Abandoning capture at sample {}: no frame end within {} bits",
            start_sample,
            bits.len()
        );

        Ok(RawFrame {
            start_sample,
            bits,
            termination: Termination::Abandoned,
        })
    }
}
