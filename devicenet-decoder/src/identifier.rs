//! DeviceNet identifier interpretation
//!
//! DeviceNet splits the 11-bit CAN identifier into four message groups:
//!
//! ```text
//! Group 1  000..3FF   0 MMMM SSSSSS    M = message id (9:6),  S = source MAC (5:0)
//! Group 2  400..5FF   10 AAAAAA MMM    A = MAC id (8:3),      M = message id (2:0)
//! Group 3  600..7BF   11 MMM SSSSSS    M = message id (8:6),  S = source MAC (5:0)
//! Group 4  7C0..7EF   11111 MMMMMM     M = message id (5:0)
//! Invalid  7F0..7FF   1111111 XXXX
//! ```

use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// Address ranges
pub const MESSAGE_GROUP_1_START: u32 = 0x000;
pub const MESSAGE_GROUP_2_START: u32 = 0x400;
pub const MESSAGE_GROUP_3_START: u32 = 0x600;
pub const MESSAGE_GROUP_4_START: u32 = 0x7C0;
pub const INVALID_CAN_IDS_START: u32 = 0x7F0;
pub const INVALID_IDENTIFIER_START: u32 = 0x800;

// Sub-field masks and shifts
const GROUP_1_MESSAGE_ID_MASK: u32 = 0x3C0;
const GROUP_1_MESSAGE_ID_SHIFT: u32 = 6;
const SOURCE_MAC_ID_MASK: u32 = 0x03F;
const MAC_ID_MASK: u32 = 0x1F8;
const MAC_ID_SHIFT: u32 = 3;
const GROUP_2_MESSAGE_ID_MASK: u32 = 0x007;
const GROUP_3_MESSAGE_ID_MASK: u32 = 0x1C0;
const GROUP_3_MESSAGE_ID_SHIFT: u32 = 6;
const GROUP_4_MESSAGE_ID_MASK: u32 = 0x03F;

/// Highest MAC id on a DeviceNet link
pub const MAX_MAC_ID: u8 = 63;
/// Highest message id defined for group 4
pub const MAX_GROUP_4_MESSAGE_ID: u8 = 0x2F;

// Special message ids
const GROUP_2_CONNECTION_MANAGEMENT: u8 = 6;
const GROUP_2_DUPLICATE_MAC_CHECK: u8 = 7;
const GROUP_3_EXPLICIT_RESPONSE: u8 = 5;
const GROUP_3_EXPLICIT_REQUEST: u8 = 6;
// Message id 7 would overlap group 4, so group 3 stops at 6
const MAX_GROUP_3_MESSAGE_ID: u8 = 6;
const GROUP_4_LAST_RESERVED: u8 = 0x2B;
const GROUP_4_COMM_FAULTED_RESPONSE: u8 = 0x2C;
const GROUP_4_COMM_FAULTED_REQUEST: u8 = 0x2D;
const GROUP_4_OFFLINE_OWNERSHIP_RESPONSE: u8 = 0x2E;
const GROUP_4_OFFLINE_OWNERSHIP_REQUEST: u8 = 0x2F;

/// DeviceNet message group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageGroup {
    Group1,
    Group2,
    Group3,
    Group4,
}

impl fmt::Display for MessageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = match self {
            MessageGroup::Group1 => 1,
            MessageGroup::Group2 => 2,
            MessageGroup::Group3 => 3,
            MessageGroup::Group4 => 4,
        };
        write!(f, "Group {}", number)
    }
}

/// Interpretation of an identifier value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierClass {
    Group1 { message_id: u8, source_mac: u8 },
    Group2 { mac_id: u8, message_id: u8 },
    Group3 { message_id: u8, source_mac: u8 },
    Group4 { message_id: u8 },
    /// 0x7F0..=0x7FF, not usable on a DeviceNet link
    InvalidCanIdentifier,
    /// Does not fit in 11 bits
    OutOfRange,
}

/// A classified DeviceNet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNetIdentifier {
    pub raw: u32,
    pub class: IdentifierClass,
}

impl DeviceNetIdentifier {
    /// Interpret an identifier value
    pub fn classify(raw: u32) -> Self {
        let class = if raw >= INVALID_IDENTIFIER_START {
            IdentifierClass::OutOfRange
        } else if raw >= INVALID_CAN_IDS_START {
            IdentifierClass::InvalidCanIdentifier
        } else if raw >= MESSAGE_GROUP_4_START {
            IdentifierClass::Group4 {
                message_id: (raw & GROUP_4_MESSAGE_ID_MASK) as u8,
            }
        } else if raw >= MESSAGE_GROUP_3_START {
            IdentifierClass::Group3 {
                message_id: ((raw & GROUP_3_MESSAGE_ID_MASK) >> GROUP_3_MESSAGE_ID_SHIFT) as u8,
                source_mac: (raw & SOURCE_MAC_ID_MASK) as u8,
            }
        } else if raw >= MESSAGE_GROUP_2_START {
            IdentifierClass::Group2 {
                mac_id: ((raw & MAC_ID_MASK) >> MAC_ID_SHIFT) as u8,
                message_id: (raw & GROUP_2_MESSAGE_ID_MASK) as u8,
            }
        } else {
            IdentifierClass::Group1 {
                message_id: ((raw & GROUP_1_MESSAGE_ID_MASK) >> GROUP_1_MESSAGE_ID_SHIFT) as u8,
                source_mac: (raw & SOURCE_MAC_ID_MASK) as u8,
            }
        };

        Self { raw, class }
    }

    /// Build an identifier from its group sub-fields
    ///
    /// `mac_id` is the source MAC for groups 1 and 3, the MAC id for group 2,
    /// and ignored for group 4.
    pub fn compose(group: MessageGroup, message_id: u8, mac_id: u8) -> Result<Self> {
        let check = |value: u8, max: u8, what: &str| -> Result<u32> {
            if value > max {
                return Err(DecoderError::InvalidIdentifier(format!(
                    "{} {} 0x{:X} exceeds 0x{:X}",
                    group, what, value, max
                )));
            }
            Ok(u32::from(value))
        };

        let raw = match group {
            MessageGroup::Group1 => {
                MESSAGE_GROUP_1_START
                    | (check(message_id, 0x0F, "message id")? << GROUP_1_MESSAGE_ID_SHIFT)
                    | check(mac_id, MAX_MAC_ID, "MAC id")?
            }
            MessageGroup::Group2 => {
                MESSAGE_GROUP_2_START
                    | (check(mac_id, MAX_MAC_ID, "MAC id")? << MAC_ID_SHIFT)
                    | check(message_id, 0x07, "message id")?
            }
            MessageGroup::Group3 => {
                MESSAGE_GROUP_3_START
                    | (check(message_id, MAX_GROUP_3_MESSAGE_ID, "message id")? << GROUP_3_MESSAGE_ID_SHIFT)
                    | check(mac_id, MAX_MAC_ID, "MAC id")?
            }
            MessageGroup::Group4 => {
                MESSAGE_GROUP_4_START | check(message_id, MAX_GROUP_4_MESSAGE_ID, "message id")?
            }
        };

        Ok(Self::classify(raw))
    }

    /// Message group, if the identifier belongs to one
    pub fn group(&self) -> Option<MessageGroup> {
        match self.class {
            IdentifierClass::Group1 { .. } => Some(MessageGroup::Group1),
            IdentifierClass::Group2 { .. } => Some(MessageGroup::Group2),
            IdentifierClass::Group3 { .. } => Some(MessageGroup::Group3),
            IdentifierClass::Group4 { .. } => Some(MessageGroup::Group4),
            IdentifierClass::InvalidCanIdentifier | IdentifierClass::OutOfRange => None,
        }
    }

    /// Group-specific message id
    pub fn message_id(&self) -> Option<u8> {
        match self.class {
            IdentifierClass::Group1 { message_id, .. }
            | IdentifierClass::Group2 { message_id, .. }
            | IdentifierClass::Group3 { message_id, .. }
            | IdentifierClass::Group4 { message_id } => Some(message_id),
            _ => None,
        }
    }

    /// Source MAC (groups 1 and 3) or MAC id (group 2)
    pub fn mac_id(&self) -> Option<u8> {
        match self.class {
            IdentifierClass::Group1 { source_mac, .. }
            | IdentifierClass::Group3 { source_mac, .. } => Some(source_mac),
            IdentifierClass::Group2 { mac_id, .. } => Some(mac_id),
            _ => None,
        }
    }

    pub fn is_invalid_can_identifier(&self) -> bool {
        self.class == IdentifierClass::InvalidCanIdentifier
    }

    pub fn is_identifier_error(&self) -> bool {
        self.class == IdentifierClass::OutOfRange
    }

    pub fn is_connection_management(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group2 { message_id: GROUP_2_CONNECTION_MANAGEMENT, .. }
        )
    }

    pub fn is_duplicate_mac_check(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group2 { message_id: GROUP_2_DUPLICATE_MAC_CHECK, .. }
        )
    }

    pub fn is_explicit_response(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group3 { message_id: GROUP_3_EXPLICIT_RESPONSE, .. }
        )
    }

    pub fn is_explicit_request(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group3 { message_id: GROUP_3_EXPLICIT_REQUEST, .. }
        )
    }

    pub fn is_communication_faulted(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group4 {
                message_id: GROUP_4_COMM_FAULTED_RESPONSE | GROUP_4_COMM_FAULTED_REQUEST
            }
        )
    }

    pub fn is_offline_ownership(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group4 {
                message_id: GROUP_4_OFFLINE_OWNERSHIP_RESPONSE | GROUP_4_OFFLINE_OWNERSHIP_REQUEST
            }
        )
    }

    /// Group 4 message ids up to 0x2B
    pub fn is_reserved(&self) -> bool {
        matches!(
            self.class,
            IdentifierClass::Group4 { message_id } if message_id <= GROUP_4_LAST_RESERVED
        )
    }

    /// Short name of the special message this identifier carries, if any
    pub fn role(&self) -> Option<&'static str> {
        match self.class {
            IdentifierClass::Group2 { message_id, .. } => match message_id {
                GROUP_2_CONNECTION_MANAGEMENT => Some("connection management"),
                GROUP_2_DUPLICATE_MAC_CHECK => Some("duplicate MAC check"),
                _ => None,
            },
            IdentifierClass::Group3 { message_id, .. } => match message_id {
                GROUP_3_EXPLICIT_RESPONSE => Some("explicit response"),
                GROUP_3_EXPLICIT_REQUEST => Some("explicit request"),
                _ => None,
            },
            IdentifierClass::Group4 { message_id } => match message_id {
                GROUP_4_COMM_FAULTED_RESPONSE => Some("communication faulted response"),
                GROUP_4_COMM_FAULTED_REQUEST => Some("communication faulted request"),
                GROUP_4_OFFLINE_OWNERSHIP_RESPONSE => Some("offline ownership response"),
                GROUP_4_OFFLINE_OWNERSHIP_REQUEST => Some("offline ownership request"),
                _ => Some("reserved"),
            },
            _ => None,
        }
    }
}

impl fmt::Display for DeviceNetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            IdentifierClass::Group1 { message_id, source_mac } => write!(
                f,
                "Group 1 msg 0x{:X} src MAC {}",
                message_id, source_mac
            )?,
            IdentifierClass::Group2 { mac_id, message_id } => {
                write!(f, "Group 2 MAC {} msg 0x{:X}", mac_id, message_id)?
            }
            IdentifierClass::Group3 { message_id, source_mac } => write!(
                f,
                "Group 3 msg 0x{:X} src MAC {}",
                message_id, source_mac
            )?,
            IdentifierClass::Group4 { message_id } => write!(f, "Group 4 msg 0x{:02X}", message_id)?,
            IdentifierClass::InvalidCanIdentifier => {
                return write!(f, "Invalid CAN identifier 0x{:03X}", self.raw)
            }
            IdentifierClass::OutOfRange => {
                return write!(f, "Identifier error 0x{:X}", self.raw)
            }
        }

        if let Some(role) = self.role() {
            write!(f, " ({})", role)?;
        }
        Ok(())
    }
}
