//! Frame field codec
//!
//! Decoding walks a [`RawFrame`] through a [`Destuffer`] and emits one
//! [`FieldRecord`] per field into a [`ResultsSink`]. Fields are decoded
//! strictly in transmission order:
//!
//! ```text
//! SOF | identifier (11) | RTR | IDE | r0 | DLC (4) | data (0..8 bytes) | CRC (15) | CRC del | ACK | ACK del
//! ```
//!
//! When the destuffer runs out of raw bits the rest of the frame is skipped
//! and no record is emitted for the incomplete field. Validation problems
//! never abort decoding; they are reported as [`FieldFlags`].
//!
//! [`FrameBits`] is the encoding direction: it assembles the unstuffed bits
//! of a standard frame from field values.

use crate::acquire::RawFrame;
use crate::crc::{self, CRC15_BITS};
use crate::destuff::{self, BitProvenance, Destuffer, LogicalBit};
use crate::identifier::{DeviceNetIdentifier, INVALID_IDENTIFIER_START};
use crate::results::ResultsSink;
use crate::types::{
    BusLevel, DecoderError, FieldFlags, FieldKind, FieldRecord, Marker, MarkerKind, Result,
};

/// Bits in a standard identifier
pub const IDENTIFIER_BITS: u32 = 11;
/// Additional identifier bits of an extended frame
pub const EXTENDED_IDENTIFIER_BITS: u32 = 18;
/// Bits in the data length code
pub const DLC_BITS: u32 = 4;
/// Largest payload of a classic CAN frame
pub const MAX_DATA_BYTES: usize = 8;
/// Largest value the data length code can carry
pub const MAX_DATA_LENGTH_CODE: u8 = 0x0F;

/// What the decoder learned about one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Identifier of a standard frame, once decoded
    pub identifier: Option<u32>,
    /// RTR bit was recessive
    pub remote: bool,
    /// All fields through the ACK delimiter were decoded
    pub complete: bool,
    /// Transmitted CRC differs from the received bits
    pub crc_mismatch: bool,
    /// Field records emitted
    pub records: usize,
}

/// Decode the fields of a raw frame into `sink`
///
/// Records are emitted as each field completes. Sample markers for every
/// consumed raw bit follow the records. The frame is not committed.
pub fn decode_frame<S: ResultsSink + ?Sized>(raw: &RawFrame, sink: &mut S) -> DecodeSummary {
    let mut decoder = FieldDecoder {
        destuffer: Destuffer::new(&raw.bits),
        sink,
        crc_bits: Vec::with_capacity(raw.bits.len()),
        summary: DecodeSummary::default(),
    };

    if decoder.decode().is_none() {
        log::debug!(
            "Frame at sample {} ran out of bits after {} records",
            raw.start_sample,
            decoder.summary.records
        );
    }

    let FieldDecoder {
        destuffer,
        sink,
        summary,
        ..
    } = decoder;

    for bit in destuffer.trail() {
        let kind = match bit.provenance {
            BitProvenance::Normal => MarkerKind::Dot,
            BitProvenance::StuffBit => MarkerKind::StuffBit,
        };
        sink.emit_marker(Marker::new(bit.sample, kind));
    }

    summary
}

/// Bits of one field, MSB first
struct FieldBits {
    value: u64,
    start_sample: u64,
    end_sample: u64,
}

struct FieldDecoder<'a, 'b, S: ResultsSink + ?Sized> {
    destuffer: Destuffer<'a>,
    sink: &'b mut S,
    /// Logical bits covered by the CRC
    crc_bits: Vec<BusLevel>,
    summary: DecodeSummary,
}

impl<'a, 'b, S: ResultsSink + ?Sized> FieldDecoder<'a, 'b, S> {
    /// Returns `None` as soon as the raw bits are exhausted
    fn decode(&mut self) -> Option<()> {
        let start = self.destuffer.next_stuffed_bit(true)?;
        self.crc_bits.push(start.level);

        let identifier = self.read_field(IDENTIFIER_BITS)?;
        let bit0 = self.next_bit()?;
        let bit1 = self.next_bit()?;

        let (rtr, reserved_ok) = if bit1.level == BusLevel::Dominant {
            // bit0 is RTR, bit1 is IDE
            let r0 = self.next_bit()?;
            self.emit_identifier(&identifier, bit0);
            (bit0, r0.level == BusLevel::Dominant)
        } else {
            // bit0 is SRR; not valid DeviceNet, decoded for visibility only
            let extension = self.read_field(EXTENDED_IDENTIFIER_BITS)?;
            let rtr = self.next_bit()?;
            let r1 = self.next_bit()?;
            let r0 = self.next_bit()?;
            self.emit_extended_identifier(&identifier, &extension, rtr);
            (
                rtr,
                r1.level == BusLevel::Dominant && r0.level == BusLevel::Dominant,
            )
        };
        let remote = rtr.level == BusLevel::Recessive;
        self.summary.remote = remote;

        let dlc = self.read_field(DLC_BITS)?;
        let dlc_value = dlc.value as u8;
        let flags = FieldFlags {
            reserved_bits_error: !reserved_ok,
            data_length_error: dlc_value == 0 || usize::from(dlc_value) > MAX_DATA_BYTES,
            ..Default::default()
        };
        self.emit(
            FieldRecord::new(FieldKind::Control, dlc.start_sample, dlc.end_sample, dlc.value)
                .with_flags(flags),
        );

        if !remote {
            let bytes = usize::from(dlc_value).min(MAX_DATA_BYTES);
            for _ in 0..bytes {
                let byte = self.read_field(8)?;
                self.emit(FieldRecord::new(
                    FieldKind::Data,
                    byte.start_sample,
                    byte.end_sample,
                    byte.value,
                ));
            }
        }

        let expected_crc = crc::compute(&self.crc_bits);
        let transmitted = self.read_field(CRC15_BITS)?;
        let crc_mismatch = transmitted.value != u64::from(expected_crc);
        if crc_mismatch {
            log::warn!(
                "CRC mismatch at sample {}: received 0x{:04X}, computed 0x{:04X}",
                transmitted.start_sample,
                transmitted.value,
                expected_crc
            );
        }
        self.summary.crc_mismatch = crc_mismatch;
        self.emit(
            FieldRecord::new(
                FieldKind::Crc,
                transmitted.start_sample,
                transmitted.end_sample,
                transmitted.value,
            )
            .with_flags(FieldFlags {
                crc_mismatch,
                ..Default::default()
            }),
        );

        // A stuff bit may still follow the last CRC bit
        let crc_delimiter = self.destuffer.next_stuffed_bit(false)?;
        let ack_slot = self.destuffer.next_fixed_form_bit()?;
        let ack_delimiter = self.destuffer.next_fixed_form_bit()?;

        let acked = ack_slot.level == BusLevel::Dominant;
        let form_error = crc_delimiter.level == BusLevel::Dominant
            || ack_delimiter.level == BusLevel::Dominant;
        self.emit(
            FieldRecord::new(
                FieldKind::Ack,
                ack_slot.sample,
                ack_delimiter.sample,
                u64::from(acked),
            )
            .with_flags(FieldFlags {
                form_error,
                ..Default::default()
            }),
        );

        self.summary.complete = true;
        Some(())
    }

    fn next_bit(&mut self) -> Option<LogicalBit> {
        let bit = self.destuffer.next_stuffed_bit(false)?;
        self.crc_bits.push(bit.level);
        Some(bit)
    }

    fn read_field(&mut self, width: u32) -> Option<FieldBits> {
        let mut value = 0u64;
        let mut start_sample = 0;
        let mut end_sample = 0;
        for i in 0..width {
            let bit = self.next_bit()?;
            if i == 0 {
                start_sample = bit.sample;
            }
            end_sample = bit.sample;
            value = (value << 1) | u64::from(bit.level.as_bit());
        }
        Some(FieldBits {
            value,
            start_sample,
            end_sample,
        })
    }

    fn emit_identifier(&mut self, identifier: &FieldBits, rtr: LogicalBit) {
        let raw = identifier.value as u32;
        let classified = DeviceNetIdentifier::classify(raw);
        let remote = rtr.level == BusLevel::Recessive;
        let flags = FieldFlags {
            remote_frame: remote,
            rtr_bit_error: remote,
            identifier_error: raw >= INVALID_IDENTIFIER_START,
            invalid_can_identifier: classified.is_invalid_can_identifier(),
            ..Default::default()
        };
        if remote {
            log::warn!("RTR bit set on identifier 0x{:03X}", raw);
        }
        self.summary.identifier = Some(raw);
        self.emit(
            FieldRecord::new(
                FieldKind::Identifier,
                identifier.start_sample,
                rtr.sample,
                identifier.value,
            )
            .with_flags(flags),
        );
    }

    fn emit_extended_identifier(
        &mut self,
        identifier: &FieldBits,
        extension: &FieldBits,
        rtr: LogicalBit,
    ) {
        let value = (identifier.value << EXTENDED_IDENTIFIER_BITS) | extension.value;
        log::debug!("Extended identifier 0x{:08X} on a DeviceNet bus", value);
        let remote = rtr.level == BusLevel::Recessive;
        self.emit(
            FieldRecord::new(
                FieldKind::IdentifierExtended,
                identifier.start_sample,
                rtr.sample,
                value,
            )
            .with_flags(FieldFlags {
                remote_frame: remote,
                rtr_bit_error: remote,
                ..Default::default()
            }),
        );
    }

    fn emit(&mut self, record: FieldRecord) {
        log::trace!(
            "{} {}..{} = 0x{:X}",
            record.kind,
            record.start_sample,
            record.end_sample,
            record.value
        );
        self.summary.records += 1;
        self.sink.emit_field(record);
    }
}

/// Unstuffed bits of a standard data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBits {
    identifier: u16,
    remote: bool,
    data_length_code: u8,
    data: Vec<u8>,
}

impl FrameBits {
    /// Data frame carrying `data`; the length code follows the payload size
    pub fn new(identifier: u32, data: &[u8]) -> Result<Self> {
        if identifier >= INVALID_IDENTIFIER_START {
            return Err(DecoderError::InvalidIdentifier(format!(
                "0x{:X} does not fit in 11 bits",
                identifier
            )));
        }
        if data.len() > MAX_DATA_BYTES {
            return Err(DecoderError::InvalidData(format!(
                "{} data bytes, at most {} fit in a frame",
                data.len(),
                MAX_DATA_BYTES
            )));
        }

        Ok(Self {
            identifier: identifier as u16,
            remote: false,
            data_length_code: data.len() as u8,
            data: data.to_vec(),
        })
    }

    /// Builder method: set the RTR bit
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// Builder method: override the data length code
    pub fn with_data_length_code(mut self, dlc: u8) -> Result<Self> {
        if dlc > MAX_DATA_LENGTH_CODE {
            return Err(DecoderError::InvalidData(format!(
                "data length code {} does not fit in 4 bits",
                dlc
            )));
        }
        self.data_length_code = dlc;
        Ok(self)
    }

    pub fn identifier(&self) -> u32 {
        u32::from(self.identifier)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_length_code(&self) -> u8 {
        self.data_length_code
    }

    /// Identifier bits followed by the RTR bit
    pub fn arbitration(&self) -> Vec<BusLevel> {
        let mut bits = Vec::with_capacity(IDENTIFIER_BITS as usize + 1);
        push_bits(&mut bits, u64::from(self.identifier), IDENTIFIER_BITS);
        bits.push(BusLevel::from_bit(self.remote));
        bits
    }

    /// IDE, r0 and the data length code
    pub fn control(&self) -> Vec<BusLevel> {
        let mut bits = vec![BusLevel::Dominant, BusLevel::Dominant];
        push_bits(&mut bits, u64::from(self.data_length_code), DLC_BITS);
        bits
    }

    /// Payload bits, MSB first per byte
    pub fn data_field(&self) -> Vec<BusLevel> {
        let mut bits = Vec::with_capacity(self.data.len() * 8);
        if !self.remote {
            for &byte in &self.data {
                push_bits(&mut bits, u64::from(byte), 8);
            }
        }
        bits
    }

    /// Everything the CRC covers: SOF, arbitration, control, data
    pub fn pre_crc_bits(&self) -> Vec<BusLevel> {
        let mut bits = vec![BusLevel::Dominant];
        bits.extend(self.arbitration());
        bits.extend(self.control());
        bits.extend(self.data_field());
        bits
    }

    pub fn crc(&self) -> u16 {
        crc::compute(&self.pre_crc_bits())
    }

    /// Bits from SOF through CRC, before stuffing
    pub fn unstuffed(&self) -> Vec<BusLevel> {
        let mut bits = self.pre_crc_bits();
        let crc = crc::compute(&bits);
        push_bits(&mut bits, u64::from(crc), CRC15_BITS);
        bits
    }

    /// Bits from SOF through CRC as they appear on the bus
    pub fn stuffed(&self) -> Vec<BusLevel> {
        destuff::stuff(&self.unstuffed())
    }
}

/// Append the low `width` bits of `value`, MSB first
pub fn push_bits(bits: &mut Vec<BusLevel>, value: u64, width: u32) {
    for i in (0..width).rev() {
        bits.push(BusLevel::from_bit((value >> i) & 1 == 1));
    }
}
