//! Core types for the DeviceNet decoder library
//!
//! This module defines the fundamental values that flow through the decoder:
//! physical channel levels, logical bus levels, the field records emitted for
//! every decoded frame, and the error type shared by every component.
//!
//! Bus-level faults (stuff errors, bad identifiers, CRC mismatches) are never
//! reported through [`DecoderError`]. They are flags on the emitted records so
//! the decode loop can keep observing the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for wall-clock annotations of captures
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Physical level of a sampled channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitState {
    Low,
    High,
}

impl BitState {
    /// The opposite physical level
    pub fn invert(self) -> Self {
        match self {
            BitState::Low => BitState::High,
            BitState::High => BitState::Low,
        }
    }
}

/// Logical CAN bus level after the polarity mapping has been applied
///
/// Dominant always wins wired-OR arbitration and is transmitted as logic `0`;
/// recessive is logic `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusLevel {
    Dominant,
    Recessive,
}

impl BusLevel {
    /// Map a logic bit (`true` = 1) to a bus level
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            BusLevel::Recessive
        } else {
            BusLevel::Dominant
        }
    }

    /// Logic value of this level (recessive = 1)
    pub fn as_bit(self) -> bool {
        self == BusLevel::Recessive
    }

    /// The complementary level, as inserted by bit stuffing
    pub fn complement(self) -> Self {
        match self {
            BusLevel::Dominant => BusLevel::Recessive,
            BusLevel::Recessive => BusLevel::Dominant,
        }
    }
}

/// Kind of a decoded frame field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// 11-bit identifier (standard frame)
    Identifier,
    /// 29-bit identifier; never valid DeviceNet traffic, kept for diagnostics
    IdentifierExtended,
    /// Data length code
    Control,
    /// One data byte
    Data,
    /// Transmitted 15-bit CRC sequence
    Crc,
    /// ACK slot and delimiter
    Ack,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Identifier => write!(f, "Identifier"),
            FieldKind::IdentifierExtended => write!(f, "Identifier (extended)"),
            FieldKind::Control => write!(f, "Control"),
            FieldKind::Data => write!(f, "Data"),
            FieldKind::Crc => write!(f, "CRC"),
            FieldKind::Ack => write!(f, "ACK"),
        }
    }
}

/// Semantic validation flags attached to a [`FieldRecord`]
///
/// None of these abort decoding; they annotate the record on which the
/// problem was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    /// RTR bit was recessive
    #[serde(default)]
    pub remote_frame: bool,
    /// RTR bit was not dominant (DeviceNet never sends remote frames)
    #[serde(default)]
    pub rtr_bit_error: bool,
    /// Identifier value beyond the 11-bit range
    #[serde(default)]
    pub identifier_error: bool,
    /// Identifier in the reserved 0x7F0..=0x7FF range
    #[serde(default)]
    pub invalid_can_identifier: bool,
    /// r1/r0 were not both dominant
    #[serde(default)]
    pub reserved_bits_error: bool,
    /// DLC of 0, or above 8
    #[serde(default)]
    pub data_length_error: bool,
    /// Transmitted CRC differs from the CRC of the received bits
    #[serde(default)]
    pub crc_mismatch: bool,
    /// CRC delimiter or ACK delimiter was dominant
    #[serde(default)]
    pub form_error: bool,
}

impl FieldFlags {
    /// True when no flag is set
    pub fn is_empty(&self) -> bool {
        self.names().is_empty()
    }

    /// Names of all set flags, for reports
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let table = [
            (self.remote_frame, "remote-frame"),
            (self.rtr_bit_error, "rtr-bit-error"),
            (self.identifier_error, "identifier-error"),
            (self.invalid_can_identifier, "invalid-can-identifier"),
            (self.reserved_bits_error, "reserved-bits-error"),
            (self.data_length_error, "data-length-error"),
            (self.crc_mismatch, "crc-mismatch"),
            (self.form_error, "form-error"),
        ];
        for (set, name) in table {
            if set {
                names.push(name);
            }
        }
        names
    }
}

/// One decoded field of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Which field this is
    pub kind: FieldKind,
    /// First sample of the field (inclusive)
    pub start_sample: u64,
    /// Last sample of the field (inclusive)
    pub end_sample: u64,
    /// Numeric payload: identifier, DLC, data byte, CRC, or ACK (1 = asserted)
    pub value: u64,
    /// Validation flags
    #[serde(default)]
    pub flags: FieldFlags,
}

impl FieldRecord {
    pub fn new(kind: FieldKind, start_sample: u64, end_sample: u64, value: u64) -> Self {
        Self {
            kind,
            start_sample,
            end_sample,
            value,
            flags: FieldFlags::default(),
        }
    }

    /// Builder method: attach flags
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Kind of a per-sample annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    /// A data bit was sampled here
    Dot,
    /// A stuff bit was sampled and discarded here
    StuffBit,
    /// Boundary of a bit stuffing error
    ErrorMarker,
}

/// Annotation of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub sample: u64,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn new(sample: u64, kind: MarkerKind) -> Self {
        Self { sample, kind }
    }
}

/// Errors that can occur while decoding or encoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("End of capture reached at sample {sample}")]
    EndOfCapture { sample: u64 },

    #[error("Raw frame capture must start on a dominant sample (sample {sample})")]
    NotAtStartOfFrame { sample: u64 },

    #[error("Channel cannot seek backwards from sample {from} to {to}")]
    BackwardSeek { from: u64, to: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid capture: {0}")]
    CaptureFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
