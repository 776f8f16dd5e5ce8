//! Simulated DeviceNet traffic
//!
//! The encoder side of the crate. [`EncodedFrame`] turns a [`FrameBits`] into
//! the full bus bitstream, [`FrameEncoder`] writes bitstreams onto a sample
//! timeline, and [`SimulationDataGenerator`] produces a stream of frames with
//! a changing payload for exercising the decoder.

use crate::channel::Capture;
use crate::config::DecoderConfig;
use crate::fields::FrameBits;
use crate::identifier::{DeviceNetIdentifier, MessageGroup};
use crate::types::{BitState, BusLevel, DecoderError, Result};

/// Bit times of idle written before the first frame and between frames
pub const IDLE_BITS: u32 = 10;

/// Recessive bits that close a frame
pub const END_OF_FRAME_BITS: usize = 7;

/// Stuffed bits dropped from the tail of a frame when injecting an error
pub const ERROR_TRUNCATION_BITS: usize = 9;

/// Dominant bits forced onto the bus when injecting an error
pub const ERROR_FLAG_BITS: usize = 6;

/// Sample-accurate clock with fractional phase carry
///
/// Every call returns a whole number of samples; the rounding error is kept
/// and applied to the next call, so edges never drift from the ideal clock.
#[derive(Debug, Clone)]
pub struct ClockGenerator {
    samples_per_half_period: f64,
    phase: f64,
}

impl ClockGenerator {
    pub fn new(frequency_hz: u32, sample_rate_hz: u32) -> Result<Self> {
        if frequency_hz == 0 || sample_rate_hz == 0 {
            return Err(DecoderError::InvalidConfig(format!(
                "cannot generate a {} Hz clock at {} Hz",
                frequency_hz, sample_rate_hz
            )));
        }
        Ok(Self {
            samples_per_half_period: f64::from(sample_rate_hz) / (2.0 * f64::from(frequency_hz)),
            phase: 0.0,
        })
    }

    /// Samples spanned by `multiple` half periods
    pub fn advance_by_half_period(&mut self, multiple: f64) -> u64 {
        let exact = self.samples_per_half_period * multiple + self.phase;
        let samples = exact.round().max(0.0);
        self.phase = exact - samples;
        samples as u64
    }
}

/// Writable two-level signal
///
/// The level holds from the current position until the next transition;
/// [`SimulationChannel::to_capture`] freezes everything written so far.
#[derive(Debug, Clone)]
pub struct SimulationChannel {
    sample_rate_hz: u32,
    initial_state: BitState,
    state: BitState,
    position: u64,
    transitions: Vec<u64>,
}

impl SimulationChannel {
    pub fn new(sample_rate_hz: u32, initial_state: BitState) -> Self {
        Self {
            sample_rate_hz,
            initial_state,
            state: initial_state,
            position: 0,
            transitions: Vec::new(),
        }
    }

    pub fn advance(&mut self, samples: u64) {
        self.position += samples;
    }

    /// Toggle the level at the current position
    pub fn transition(&mut self) {
        // two toggles on one sample cancel out
        if self.transitions.last() == Some(&self.position) {
            self.transitions.pop();
        } else {
            self.transitions.push(self.position);
        }
        self.state = self.state.invert();
    }

    pub fn transition_if_needed(&mut self, state: BitState) {
        if self.state != state {
            self.transition();
        }
    }

    pub fn current_state(&self) -> BitState {
        self.state
    }

    pub fn sample_number(&self) -> u64 {
        self.position
    }

    /// Everything written so far as a [`Capture`]
    pub fn to_capture(&self) -> Capture {
        let mut capture = Capture::new(self.sample_rate_hz, self.initial_state);
        capture.length = self.position;
        capture.transitions = self
            .transitions
            .iter()
            .copied()
            .filter(|&t| t < self.position)
            .collect();
        capture
    }
}

/// A frame as it appears on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bits: FrameBits,
    ack: bool,
    stuffed: Vec<BusLevel>,
}

impl EncodedFrame {
    /// Stuff the frame; `ack` decides whether a receiver drives the ACK slot
    pub fn new(bits: FrameBits, ack: bool) -> Self {
        let stuffed = bits.stuffed();
        Self { bits, ack, stuffed }
    }

    pub fn bits(&self) -> &FrameBits {
        &self.bits
    }

    pub fn ack(&self) -> bool {
        self.ack
    }

    /// SOF through CRC with stuff bits inserted
    pub fn stuffed(&self) -> &[BusLevel] {
        &self.stuffed
    }

    /// Complete frame: stuffed region, CRC delimiter, ACK field, end of frame
    pub fn waveform(&self) -> Vec<BusLevel> {
        let mut levels = self.stuffed.clone();
        levels.push(BusLevel::Recessive);
        levels.push(if self.ack {
            BusLevel::Dominant
        } else {
            BusLevel::Recessive
        });
        levels.push(BusLevel::Recessive);
        levels.extend([BusLevel::Recessive; END_OF_FRAME_BITS]);
        levels
    }

    /// Frame cut short by an error flag
    ///
    /// The last stuffed bits are replaced by six dominant bits, which the
    /// decoder reports as a bit stuffing error.
    pub fn error_waveform(&self) -> Vec<BusLevel> {
        let keep = self.stuffed.len().saturating_sub(ERROR_TRUNCATION_BITS);
        let mut levels = self.stuffed[..keep].to_vec();
        levels.extend([BusLevel::Dominant; ERROR_FLAG_BITS]);
        levels.extend([BusLevel::Recessive; END_OF_FRAME_BITS]);
        levels
    }
}

/// Writes bus levels onto a simulated sample timeline
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    config: DecoderConfig,
    clock: ClockGenerator,
    channel: SimulationChannel,
}

impl FrameEncoder {
    /// Start a recessive timeline
    pub fn new(config: DecoderConfig, sample_rate_hz: u32) -> Result<Self> {
        let clock = ClockGenerator::new(config.bit_rate.hz(), sample_rate_hz)?;
        let channel = SimulationChannel::new(sample_rate_hz, config.recessive());
        Ok(Self {
            config,
            clock,
            channel,
        })
    }

    /// Hold the bus recessive for `bits` bit times
    pub fn idle(&mut self, bits: u32) {
        self.channel.transition_if_needed(self.config.recessive());
        let samples = self.clock.advance_by_half_period(2.0 * f64::from(bits));
        self.channel.advance(samples);
    }

    /// Drive each level for one bit time
    pub fn write_levels(&mut self, levels: &[BusLevel]) {
        for &level in levels {
            self.channel
                .transition_if_needed(self.config.bit_state(level));
            let samples = self.clock.advance_by_half_period(2.0);
            self.channel.advance(samples);
        }
    }

    /// Write a frame and return the sample of its start-of-frame edge
    pub fn write_frame(&mut self, frame: &EncodedFrame) -> u64 {
        let start = self.channel.sample_number();
        self.write_levels(&frame.waveform());
        start
    }

    /// Write a frame ending in an error flag; returns its start sample
    pub fn write_error_frame(&mut self, frame: &EncodedFrame) -> u64 {
        let start = self.channel.sample_number();
        self.write_levels(&frame.error_waveform());
        start
    }

    pub fn sample_number(&self) -> u64 {
        self.channel.sample_number()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Everything written so far
    pub fn capture(&self) -> Capture {
        self.channel.to_capture()
    }
}

/// One frame written by the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFrame {
    pub frame: EncodedFrame,
    /// Sample of the start-of-frame edge
    pub start_sample: u64,
    pub error_injected: bool,
}

/// Endless stream of DeviceNet test traffic
///
/// Each payload `value..value+7` is sent twice, first acknowledged and then
/// without acknowledgement, after which the counter moves on.
#[derive(Debug, Clone)]
pub struct SimulationDataGenerator {
    encoder: FrameEncoder,
    identifier: DeviceNetIdentifier,
    value: u8,
    frames_written: u64,
    errors_injected: u64,
    error_every: Option<u64>,
}

impl SimulationDataGenerator {
    /// Group 1 message 0xC from MAC 0x2F
    pub fn new(config: DecoderConfig, sample_rate_hz: u32) -> Result<Self> {
        config.validate(sample_rate_hz)?;

        let mut encoder = FrameEncoder::new(config, sample_rate_hz)?;
        encoder.idle(IDLE_BITS);

        Ok(Self {
            encoder,
            identifier: DeviceNetIdentifier::compose(MessageGroup::Group1, 0xC, 0x2F)?,
            value: 0,
            frames_written: 0,
            errors_injected: 0,
            error_every: None,
        })
    }

    /// Builder method: identifier carried by every frame
    pub fn with_identifier(mut self, identifier: DeviceNetIdentifier) -> Self {
        self.identifier = identifier;
        self
    }

    /// Builder method: replace every `n`th frame with an error frame (0 disables)
    pub fn with_error_every(mut self, n: u64) -> Self {
        self.error_every = (n > 0).then_some(n);
        self
    }

    pub fn identifier(&self) -> DeviceNetIdentifier {
        self.identifier
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn errors_injected(&self) -> u64 {
        self.errors_injected
    }

    pub fn sample_number(&self) -> u64 {
        self.encoder.sample_number()
    }

    /// Write the next frame of the pattern
    pub fn generate_frame(&mut self) -> Result<SimulatedFrame> {
        let ack = self.frames_written % 2 == 0;
        let payload: Vec<u8> = (0..8u8).map(|i| self.value.wrapping_add(i)).collect();
        let frame = EncodedFrame::new(FrameBits::new(self.identifier.raw, &payload)?, ack);

        let error_injected = self
            .error_every
            .is_some_and(|n| (self.frames_written + 1) % n == 0);
        let start_sample = if error_injected {
            self.errors_injected += 1;
            log::debug!("Injecting error frame {}", self.frames_written);
            self.encoder.write_error_frame(&frame)
        } else {
            self.encoder.write_frame(&frame)
        };
        self.encoder.idle(IDLE_BITS);

        if !ack {
            self.value = self.value.wrapping_add(1);
        }
        self.frames_written += 1;

        Ok(SimulatedFrame {
            frame,
            start_sample,
            error_injected,
        })
    }

    /// Write `count` frames
    pub fn generate_frames(&mut self, count: usize) -> Result<Vec<SimulatedFrame>> {
        (0..count).map(|_| self.generate_frame()).collect()
    }

    /// Write frames until the timeline reaches `sample`
    pub fn generate_until(&mut self, sample: u64) -> Result<Vec<SimulatedFrame>> {
        let mut frames = Vec::new();
        while self.encoder.sample_number() < sample {
            frames.push(self.generate_frame()?);
        }
        Ok(frames)
    }

    /// Everything generated so far
    pub fn capture(&self) -> Capture {
        self.encoder.capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitRate;
    use crate::destuff;

    #[test]
    fn test_clock_generator_does_not_drift() {
        // 3.3 MHz / 250 kbit/s = 13.2 samples per bit
        let mut clock = ClockGenerator::new(250_000, 3_300_000).unwrap();
        let mut total = 0u64;
        for bit in 1..=1000u64 {
            total += clock.advance_by_half_period(2.0);
            let ideal = 13.2 * bit as f64;
            assert!((total as f64 - ideal).abs() <= 0.5, "bit {}", bit);
        }
    }

    #[test]
    fn test_clock_generator_rejects_zero() {
        assert!(ClockGenerator::new(0, 1_000_000).is_err());
        assert!(ClockGenerator::new(500_000, 0).is_err());
    }

    #[test]
    fn test_simulation_channel_capture() {
        let mut channel = SimulationChannel::new(1_000_000, BitState::High);
        channel.advance(10);
        channel.transition_if_needed(BitState::Low);
        channel.advance(5);
        channel.transition_if_needed(BitState::Low);
        channel.transition();
        channel.advance(5);

        let capture = channel.to_capture();
        assert_eq!(capture.transitions, vec![10, 15]);
        assert_eq!(capture.length, 20);
        assert!(capture.validate().is_ok());
        assert_eq!(capture.state_at(12), BitState::Low);
        assert_eq!(capture.state_at(15), BitState::High);
    }

    #[test]
    fn test_zero_width_pulse_is_dropped() {
        let mut channel = SimulationChannel::new(1_000_000, BitState::High);
        channel.advance(10);
        channel.transition();
        channel.transition();
        channel.advance(10);
        let capture = channel.to_capture();
        assert!(capture.transitions.is_empty());
        assert!(capture.validate().is_ok());
    }

    #[test]
    fn test_encoded_frame_waveforms() {
        let bits = FrameBits::new(0x32F, &[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let frame = EncodedFrame::new(bits.clone(), true);
        let stuffed = frame.stuffed().len();

        let waveform = frame.waveform();
        assert_eq!(waveform.len(), stuffed + 3 + END_OF_FRAME_BITS);
        assert_eq!(waveform[stuffed + 1], BusLevel::Dominant);
        assert_eq!(destuff::destuff(frame.stuffed()), bits.unstuffed());

        let error = frame.error_waveform();
        assert_eq!(error.len(), stuffed - 9 + 6 + END_OF_FRAME_BITS);
        assert_eq!(
            &error[stuffed - 9..stuffed - 3],
            &[BusLevel::Dominant; ERROR_FLAG_BITS]
        );

        let unacked = EncodedFrame::new(bits, false);
        assert_eq!(unacked.waveform()[stuffed + 1], BusLevel::Recessive);
    }

    #[test]
    fn test_frame_encoder_honours_polarity() {
        let config = DecoderConfig::new().with_inverted(true);
        let mut encoder = FrameEncoder::new(config, 2_000_000).unwrap();
        encoder.idle(2);
        encoder.write_levels(&[BusLevel::Dominant]);
        let capture = encoder.capture();

        assert_eq!(capture.initial_state, BitState::Low);
        assert_eq!(capture.length, 12);
        assert_eq!(capture.state_at(9), BitState::High);
    }

    #[test]
    fn test_generator_pattern() {
        let config = DecoderConfig::new().with_bit_rate(BitRate::Rate125K);
        let mut generator = SimulationDataGenerator::new(config, 1_000_000).unwrap();
        assert_eq!(generator.identifier().raw, 0x32F);
        // initial idle of ten 8-sample bits
        assert_eq!(generator.sample_number(), 80);

        let frames = generator.generate_frames(4).unwrap();
        let acks: Vec<bool> = frames.iter().map(|f| f.frame.ack()).collect();
        assert_eq!(acks, vec![true, false, true, false]);
        assert_eq!(frames[0].frame.bits().data(), frames[1].frame.bits().data());
        assert_eq!(frames[2].frame.bits().data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frames[0].start_sample, 80);
        assert!(frames.windows(2).all(|w| w[0].start_sample < w[1].start_sample));
        assert_eq!(generator.frames_written(), 4);
    }

    #[test]
    fn test_generator_payload_wraps() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), 4_000_000).unwrap();
        generator.value = 250;
        let frame = generator.generate_frame().unwrap();
        assert_eq!(
            frame.frame.bits().data(),
            &[250, 251, 252, 253, 254, 255, 0, 1]
        );
    }

    #[test]
    fn test_generator_error_injection() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), 4_000_000)
            .unwrap()
            .with_error_every(3);
        let frames = generator.generate_frames(6).unwrap();
        let injected: Vec<bool> = frames.iter().map(|f| f.error_injected).collect();
        assert_eq!(injected, vec![false, false, true, false, false, true]);
        assert_eq!(generator.errors_injected(), 2);
    }

    #[test]
    fn test_generator_until() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), 4_000_000).unwrap();
        let frames = generator.generate_until(10_000).unwrap();
        assert!(!frames.is_empty());
        assert!(generator.sample_number() >= 10_000);
        assert_eq!(generator.capture().length, generator.sample_number());
    }

    #[test]
    fn test_generator_rejects_slow_sample_rate() {
        let result = SimulationDataGenerator::new(DecoderConfig::new(), 1_000_000);
        assert!(matches!(result, Err(DecoderError::InvalidConfig(_))));
    }
}
