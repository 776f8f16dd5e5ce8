//! Results sink
//!
//! The decoder pushes field records and sample markers into a [`ResultsSink`]
//! as soon as they are decoded. Nothing becomes visible to consumers until
//! the frame is committed, which happens exactly once per decoded or errored
//! frame.

use crate::identifier::DeviceNetIdentifier;
use crate::types::{FieldKind, FieldRecord, Marker, MarkerKind};
use serde::{Deserialize, Serialize};

/// Destination for decoder output
pub trait ResultsSink {
    /// Append a decoded field to the current frame
    fn emit_field(&mut self, record: FieldRecord);

    /// Append a sample annotation to the current frame
    fn emit_marker(&mut self, marker: Marker);

    /// Publish the current frame and start a new one
    fn commit_frame(&mut self);

    /// Liveness signal: everything before `sample` has been processed
    fn report_progress(&mut self, sample: u64);
}

/// How a committed frame ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FrameStatus {
    /// Every field through ACK was decoded
    Complete,
    /// Six dominant bits cut the frame short
    StuffError { start_sample: u64, end_sample: u64 },
    /// The raw bits ran out before the ACK field
    #[default]
    Exhausted,
}

/// All output of one committed frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedFrame {
    pub status: FrameStatus,
    pub records: Vec<FieldRecord>,
    pub markers: Vec<Marker>,
}

impl DecodedFrame {
    /// Derive the status from the emitted records and markers
    fn resolve_status(&self) -> FrameStatus {
        if let Some((start_sample, end_sample)) = self.stuff_error() {
            FrameStatus::StuffError {
                start_sample,
                end_sample,
            }
        } else if self.is_complete() {
            FrameStatus::Complete
        } else {
            FrameStatus::Exhausted
        }
    }

    fn first(&self, kind: FieldKind) -> Option<&FieldRecord> {
        self.records.iter().find(|r| r.kind == kind)
    }

    /// The standard identifier record, if it was decoded
    pub fn identifier_record(&self) -> Option<&FieldRecord> {
        self.first(FieldKind::Identifier)
    }

    /// Classified identifier of a standard frame
    pub fn identifier(&self) -> Option<DeviceNetIdentifier> {
        self.identifier_record()
            .map(|r| DeviceNetIdentifier::classify(r.value as u32))
    }

    /// Data length code
    pub fn data_length_code(&self) -> Option<u8> {
        self.first(FieldKind::Control).map(|r| r.value as u8)
    }

    /// Decoded data bytes in order
    pub fn data(&self) -> Vec<u8> {
        self.records
            .iter()
            .filter(|r| r.kind == FieldKind::Data)
            .map(|r| r.value as u8)
            .collect()
    }

    /// Transmitted CRC
    pub fn crc(&self) -> Option<u16> {
        self.first(FieldKind::Crc).map(|r| r.value as u16)
    }

    /// Whether a receiver acknowledged the frame
    pub fn ack(&self) -> Option<bool> {
        self.first(FieldKind::Ack).map(|r| r.value != 0)
    }

    /// All fields up to and including ACK were decoded
    pub fn is_complete(&self) -> bool {
        self.ack().is_some()
    }

    /// Sample span of a bit stuffing error, if one ended this frame
    pub fn stuff_error(&self) -> Option<(u64, u64)> {
        let mut errors = self
            .markers
            .iter()
            .filter(|m| m.kind == MarkerKind::ErrorMarker)
            .map(|m| m.sample);
        let start = errors.next()?;
        let end = errors.next().unwrap_or(start);
        Some((start, end))
    }

    /// Earliest annotated sample of the frame
    pub fn first_sample(&self) -> Option<u64> {
        self.markers.iter().map(|m| m.sample).min()
    }

    /// Any record carries a validation flag
    pub fn has_flags(&self) -> bool {
        self.records.iter().any(|r| !r.flags.is_empty())
    }
}

/// Sink that keeps every committed frame in memory
#[derive(Debug, Default)]
pub struct FrameCollector {
    pending: DecodedFrame,
    frames: Vec<DecodedFrame>,
    progress: u64,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed frames, oldest first
    pub fn frames(&self) -> &[DecodedFrame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<DecodedFrame> {
        self.frames
    }

    /// Records emitted since the last commit
    pub fn pending_records(&self) -> usize {
        self.pending.records.len()
    }

    /// Last reported progress sample
    pub fn progress(&self) -> u64 {
        self.progress
    }
}

impl ResultsSink for FrameCollector {
    fn emit_field(&mut self, record: FieldRecord) {
        self.pending.records.push(record);
    }

    fn emit_marker(&mut self, marker: Marker) {
        self.pending.markers.push(marker);
    }

    fn commit_frame(&mut self) {
        let mut frame = std::mem::take(&mut self.pending);
        frame.status = frame.resolve_status();
        self.frames.push(frame);
    }

    fn report_progress(&mut self, sample: u64) {
        self.progress = sample;
    }
}
