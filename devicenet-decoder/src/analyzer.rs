//! Main decoder API
//!
//! [`Analyzer`] ties the pieces together: it waits for an idle bus, captures
//! a raw frame, decodes its fields into a [`ResultsSink`] and commits the
//! result, one frame at a time, until the channel runs out of data or the
//! host asks it to stop.

use crate::acquire::{FrameAcquirer, Termination};
use crate::channel::SampledChannel;
use crate::config::DecoderConfig;
use crate::fields::{self, DecodeSummary};
use crate::results::ResultsSink;
use crate::timing::SampleClock;
use crate::types::{DecoderError, Marker, MarkerKind, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared with the host
///
/// The decode loop only looks at it between frames, so a frame is never
/// left half committed.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the decode loop to finish after the current frame
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame ended normally and was committed
    Decoded(DecodeSummary),
    /// Frame was cut short by six dominant bits; what preceded it was committed
    StuffError {
        start_sample: u64,
        end_sample: u64,
        summary: DecodeSummary,
    },
    /// No frame end within the offset table; nothing was emitted
    Abandoned { start_sample: u64 },
}

/// Counters for one decode pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerStats {
    /// Frames handed to the sink
    pub frames_committed: u64,
    /// Committed frames decoded through the ACK field
    pub complete_frames: u64,
    pub stuff_errors: u64,
    pub abandoned: u64,
    pub crc_mismatches: u64,
    /// Channel position when the pass ended
    pub last_sample: u64,
}

impl AnalyzerStats {
    fn record(&mut self, outcome: &FrameOutcome) {
        let summary = match outcome {
            FrameOutcome::Decoded(summary) => summary,
            FrameOutcome::StuffError { summary, .. } => {
                self.stuff_errors += 1;
                summary
            }
            FrameOutcome::Abandoned { .. } => {
                self.abandoned += 1;
                return;
            }
        };
        self.frames_committed += 1;
        if summary.complete {
            self.complete_frames += 1;
        }
        if summary.crc_mismatch {
            self.crc_mismatches += 1;
        }
    }
}

/// DeviceNet frame decoder for one channel
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: DecoderConfig,
    clock: SampleClock,
}

impl Analyzer {
    /// Create an analyzer for captures taken at `sample_rate_hz`
    ///
    /// # Arguments
    /// * `config` - Bit rate and polarity of the bus
    /// * `sample_rate_hz` - Sample rate of the channel, at least 4x the bit rate
    ///
    /// # Returns
    /// * `Result<Analyzer>` - Err if the sample rate is too low for the bit rate
    pub fn new(config: DecoderConfig, sample_rate_hz: u32) -> Result<Self> {
        config.validate(sample_rate_hz)?;
        let clock = SampleClock::new(sample_rate_hz, config.bit_rate.hz())?;
        log::debug!(
            "{} at {} Hz: {:.2} samples per bit",
            config.bit_rate,
            sample_rate_hz,
            clock.samples_per_bit()
        );
        Ok(Self { config, clock })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    /// Acquire and decode the next frame on the channel
    ///
    /// Commits the frame to `sink` unless the capture was abandoned. Returns
    /// [`DecoderError::EndOfCapture`] when the channel runs out first; a frame
    /// cut off by the end of the capture is not committed.
    pub fn decode_next_frame<C, S>(&self, channel: &mut C, sink: &mut S) -> Result<FrameOutcome>
    where
        C: SampledChannel,
        S: ResultsSink + ?Sized,
    {
        let acquirer = FrameAcquirer::new(&self.clock, &self.config);
        acquirer.wait_for_idle(channel)?;
        channel.advance_to_next_edge()?;

        let raw = acquirer.capture_raw_frame(channel)?;
        let outcome = match raw.termination {
            Termination::Abandoned => {
                sink.report_progress(channel.sample_number());
                return Ok(FrameOutcome::Abandoned {
                    start_sample: raw.start_sample,
                });
            }
            Termination::StuffError {
                start_sample,
                end_sample,
            } => {
                sink.emit_marker(Marker::new(start_sample, MarkerKind::ErrorMarker));
                sink.emit_marker(Marker::new(end_sample, MarkerKind::ErrorMarker));
                let summary = fields::decode_frame(&raw, sink);
                FrameOutcome::StuffError {
                    start_sample,
                    end_sample,
                    summary,
                }
            }
            Termination::Complete => FrameOutcome::Decoded(fields::decode_frame(&raw, sink)),
        };

        sink.commit_frame();
        sink.report_progress(channel.sample_number());

        log::debug!("Frame at sample {}: {:?}", raw.start_sample, outcome);
        Ok(outcome)
    }

    /// Decode frames until the channel is exhausted or `stop` is raised
    ///
    /// # Arguments
    /// * `channel` - Sampled bus signal, consumed strictly forward
    /// * `sink` - Receives field records, markers and commits
    /// * `stop` - Checked between frames
    ///
    /// # Returns
    /// * `Result<AnalyzerStats>` - Counters for the pass; Err only for
    ///   channel failures other than running out of data
    ///
    /// # Example
    /// ```
    /// use devicenet_decoder::{Analyzer, DecoderConfig, FrameCollector, StopSignal};
    /// use devicenet_decoder::simulation::SimulationDataGenerator;
    ///
    /// let config = DecoderConfig::new();
    /// let mut generator = SimulationDataGenerator::new(config.clone(), 4_000_000).unwrap();
    /// generator.generate_frames(2).unwrap();
    /// let capture = generator.capture();
    ///
    /// let analyzer = Analyzer::new(config, capture.sample_rate_hz).unwrap();
    /// let mut collector = FrameCollector::new();
    /// let stats = analyzer
    ///     .run(&mut capture.cursor(), &mut collector, &StopSignal::new())
    ///     .unwrap();
    /// assert_eq!(stats.frames_committed, 2);
    /// ```
    pub fn run<C, S>(&self, channel: &mut C, sink: &mut S, stop: &StopSignal) -> Result<AnalyzerStats>
    where
        C: SampledChannel,
        S: ResultsSink + ?Sized,
    {
        log::info!(
            "Decoding channel {} at {} from sample {}",
            self.config.channel,
            self.config.bit_rate,
            channel.sample_number()
        );

        let mut stats = AnalyzerStats::default();
        while !stop.is_stopped() {
            match self.decode_next_frame(channel, sink) {
                Ok(outcome) => stats.record(&outcome),
                Err(DecoderError::EndOfCapture { sample }) => {
                    log::debug!("End of capture at sample {}", sample);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        stats.last_sample = channel.sample_number();

        log::info!(
            "Decoded {} frames ({} stuff errors, {} abandoned, {} CRC mismatches)",
            stats.frames_committed,
            stats.stuff_errors,
            stats.abandoned,
            stats.crc_mismatches
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{FrameCollector, FrameStatus};
    use crate::simulation::SimulationDataGenerator;

    const SAMPLE_RATE: u32 = 4_000_000;

    #[test]
    fn test_rejects_low_sample_rate() {
        assert!(matches!(
            Analyzer::new(DecoderConfig::new(), 1_999_999),
            Err(DecoderError::InvalidConfig(_))
        ));
        assert!(Analyzer::new(DecoderConfig::new(), 2_000_000).is_ok());
    }

    #[test]
    fn test_decode_next_frame() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), SAMPLE_RATE).unwrap();
        generator.generate_frames(2).unwrap();
        let capture = generator.capture();

        let analyzer = Analyzer::new(DecoderConfig::new(), SAMPLE_RATE).unwrap();
        let mut cursor = capture.cursor();
        let mut collector = FrameCollector::new();

        let first = analyzer.decode_next_frame(&mut cursor, &mut collector).unwrap();
        match first {
            FrameOutcome::Decoded(summary) => {
                assert!(summary.complete);
                assert_eq!(summary.identifier, Some(0x32F));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(collector.frames().len(), 1);
        assert_eq!(collector.progress(), cursor.sample_number());

        analyzer.decode_next_frame(&mut cursor, &mut collector).unwrap();
        assert_eq!(collector.frames().len(), 2);
        assert!(matches!(
            analyzer.decode_next_frame(&mut cursor, &mut collector),
            Err(DecoderError::EndOfCapture { .. })
        ));
        assert_eq!(collector.frames().len(), 2);
    }

    #[test]
    fn test_run_counts_outcomes() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), SAMPLE_RATE)
            .unwrap()
            .with_error_every(2);
        generator.generate_frames(4).unwrap();
        let capture = generator.capture();

        let analyzer = Analyzer::new(DecoderConfig::new(), SAMPLE_RATE).unwrap();
        let mut collector = FrameCollector::new();
        let stats = analyzer
            .run(&mut capture.cursor(), &mut collector, &StopSignal::new())
            .unwrap();

        assert_eq!(stats.frames_committed, 4);
        assert_eq!(stats.complete_frames, 2);
        assert_eq!(stats.stuff_errors, 2);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(stats.crc_mismatches, 0);

        let statuses: Vec<bool> = collector
            .frames()
            .iter()
            .map(|f| matches!(f.status, FrameStatus::StuffError { .. }))
            .collect();
        assert_eq!(statuses, vec![false, true, false, true]);
    }

    #[test]
    fn test_stop_signal_checked_before_each_frame() {
        let mut generator = SimulationDataGenerator::new(DecoderConfig::new(), SAMPLE_RATE).unwrap();
        generator.generate_frames(3).unwrap();
        let capture = generator.capture();

        let analyzer = Analyzer::new(DecoderConfig::new(), SAMPLE_RATE).unwrap();
        let mut collector = FrameCollector::new();
        let stop = StopSignal::new();
        let handle = stop.clone();
        handle.stop();

        let stats = analyzer
            .run(&mut capture.cursor(), &mut collector, &stop)
            .unwrap();
        assert!(stop.is_stopped());
        assert_eq!(stats.frames_committed, 0);
        assert!(collector.frames().is_empty());
    }

    #[test]
    fn test_stats_record() {
        let mut stats = AnalyzerStats::default();
        let summary = DecodeSummary {
            complete: true,
            crc_mismatch: true,
            ..Default::default()
        };
        stats.record(&FrameOutcome::Decoded(summary));
        stats.record(&FrameOutcome::Abandoned { start_sample: 0 });
        stats.record(&FrameOutcome::StuffError {
            start_sample: 1,
            end_sample: 2,
            summary: DecodeSummary::default(),
        });
        assert_eq!(stats.frames_committed, 2);
        assert_eq!(stats.complete_frames, 1);
        assert_eq!(stats.crc_mismatches, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.stuff_errors, 1);
    }
}
