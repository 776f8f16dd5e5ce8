//! Sampled channel access
//!
//! The decoder reads the bus through the [`SampledChannel`] trait: a forward-only
//! cursor over a two-level signal at a fixed sample rate. Hosts with live
//! acquisition implement it over their own buffers; [`Capture`] and
//! [`CaptureCursor`] provide an in-memory implementation backed by a list of
//! transition samples.

use crate::types::{BitState, DecoderError, Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Forward-only cursor over a sampled two-level signal
///
/// All positions are absolute sample indices. Any advancing call may block
/// until the host has acquired enough data; an implementation that has no
/// more data returns [`DecoderError::EndOfCapture`].
pub trait SampledChannel {
    /// Level at the current position
    fn current_state(&self) -> BitState;

    /// Current absolute sample index
    fn sample_number(&self) -> u64;

    /// Move to the next transition
    fn advance_to_next_edge(&mut self) -> Result<()>;

    /// Move forward by `samples`
    fn advance(&mut self, samples: u64) -> Result<()> {
        let target = self.sample_number() + samples;
        self.advance_to_abs_position(target)
    }

    /// Move forward to an absolute sample index
    fn advance_to_abs_position(&mut self, sample: u64) -> Result<()>;

    /// Whether moving forward by `samples` would cross a transition
    fn would_advancing_cause_transition(&self, samples: u64) -> bool;
}

/// A recorded two-level signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// Sample rate of the recording
    pub sample_rate_hz: u32,
    /// Level at sample 0
    pub initial_state: BitState,
    /// Strictly increasing samples at which the level toggles
    pub transitions: Vec<u64>,
    /// Number of recorded samples
    pub length: u64,
    /// Wall-clock time of sample 0, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
}

impl Capture {
    pub fn new(sample_rate_hz: u32, initial_state: BitState) -> Self {
        Self {
            sample_rate_hz,
            initial_state,
            transitions: Vec::new(),
            length: 0,
            started_at: None,
        }
    }

    /// Builder method: set the wall-clock time of sample 0
    pub fn with_start_time(mut self, started_at: Timestamp) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(DecoderError::CaptureFormat(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if let Some(pair) = self.transitions.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(DecoderError::CaptureFormat(format!(
                "transitions are not strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
        if let Some(&last) = self.transitions.last() {
            if last >= self.length {
                return Err(DecoderError::CaptureFormat(format!(
                    "transition at sample {} lies beyond capture length {}",
                    last, self.length
                )));
            }
        }
        Ok(())
    }

    /// Level at an absolute sample index
    pub fn state_at(&self, sample: u64) -> BitState {
        let toggles = self.transitions.partition_point(|&t| t <= sample);
        if toggles % 2 == 0 {
            self.initial_state
        } else {
            self.initial_state.invert()
        }
    }

    /// Wall-clock time of an absolute sample index
    pub fn timestamp_of(&self, sample: u64) -> Option<Timestamp> {
        let started_at = self.started_at?;
        let nanos = u128::from(sample) * 1_000_000_000 / u128::from(self.sample_rate_hz);
        let nanos = i64::try_from(nanos).ok()?;
        started_at.checked_add_signed(chrono::Duration::nanoseconds(nanos))
    }

    /// Cursor positioned at sample 0
    pub fn cursor(&self) -> CaptureCursor<'_> {
        CaptureCursor::new(self)
    }
}

/// [`SampledChannel`] over a borrowed [`Capture`]
#[derive(Debug, Clone)]
pub struct CaptureCursor<'a> {
    capture: &'a Capture,
    position: u64,
    state: BitState,
    next_edge: usize,
}

impl<'a> CaptureCursor<'a> {
    pub fn new(capture: &'a Capture) -> Self {
        let mut cursor = Self {
            capture,
            position: 0,
            state: capture.initial_state,
            next_edge: 0,
        };
        cursor.consume_edges_through(0);
        cursor
    }

    /// Apply every transition at or before `sample`
    fn consume_edges_through(&mut self, sample: u64) {
        while let Some(&edge) = self.capture.transitions.get(self.next_edge) {
            if edge > sample {
                break;
            }
            self.state = self.state.invert();
            self.next_edge += 1;
        }
    }
}

impl SampledChannel for CaptureCursor<'_> {
    fn current_state(&self) -> BitState {
        self.state
    }

    fn sample_number(&self) -> u64 {
        self.position
    }

    fn advance_to_next_edge(&mut self) -> Result<()> {
        let edge = *self
            .capture
            .transitions
            .get(self.next_edge)
            .ok_or(DecoderError::EndOfCapture {
                sample: self.position,
            })?;
        self.position = edge;
        self.consume_edges_through(edge);
        Ok(())
    }

    fn advance_to_abs_position(&mut self, sample: u64) -> Result<()> {
        if sample < self.position {
            return Err(DecoderError::BackwardSeek {
                from: self.position,
                to: sample,
            });
        }
        if sample >= self.capture.length {
            return Err(DecoderError::EndOfCapture { sample });
        }
        self.position = sample;
        self.consume_edges_through(sample);
        Ok(())
    }

    fn would_advancing_cause_transition(&self, samples: u64) -> bool {
        match self.capture.transitions.get(self.next_edge) {
            Some(&edge) => edge <= self.position + samples,
            None => false,
        }
    }
}
