//! Decoder configuration types
//!
//! The host owns the settings (channel, bit rate, polarity). The decoder only
//! needs read access to the resolved values and the polarity mapping derived
//! from them.

use crate::types::{BitState, BusLevel, DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DeviceNet bit rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitRate {
    /// 500 kbit/s, high-speed DeviceNet
    Rate500K,
    /// 250 kbit/s, middle-speed DeviceNet
    Rate250K,
    /// 125 kbit/s, low-speed DeviceNet
    Rate125K,
}

impl BitRate {
    /// Bit rate in bits per second
    pub fn hz(self) -> u32 {
        match self {
            BitRate::Rate500K => 500_000,
            BitRate::Rate250K => 250_000,
            BitRate::Rate125K => 125_000,
        }
    }
}

impl Default for BitRate {
    fn default() -> Self {
        BitRate::Rate500K
    }
}

impl TryFrom<u32> for BitRate {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            500_000 => Ok(BitRate::Rate500K),
            250_000 => Ok(BitRate::Rate250K),
            125_000 => Ok(BitRate::Rate125K),
            other => Err(format!(
                "unsupported DeviceNet bit rate {} (expected 500000, 250000 or 125000)",
                other
            )),
        }
    }
}

impl From<BitRate> for u32 {
    fn from(rate: BitRate) -> Self {
        rate.hz()
    }
}

impl fmt::Display for BitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Bits/s", self.hz())
    }
}

/// Configuration for the decoder library
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Channel the DeviceNet signal was captured on
    #[serde(default)]
    pub channel: u8,

    /// Bus bit rate
    #[serde(default)]
    pub bit_rate: BitRate,

    /// Swap the level mapping (use when recording CAN High directly)
    #[serde(default)]
    pub inverted: bool,
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the channel
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Builder method: set the bit rate
    pub fn with_bit_rate(mut self, bit_rate: BitRate) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Builder method: invert the polarity mapping
    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Physical level that represents a dominant bit
    pub fn dominant(&self) -> BitState {
        if self.inverted {
            BitState::High
        } else {
            BitState::Low
        }
    }

    /// Physical level that represents a recessive bit
    pub fn recessive(&self) -> BitState {
        self.dominant().invert()
    }

    pub fn is_dominant(&self, state: BitState) -> bool {
        state == self.dominant()
    }

    pub fn is_recessive(&self, state: BitState) -> bool {
        state == self.recessive()
    }

    /// Map a physical level to a bus level
    pub fn bus_level(&self, state: BitState) -> BusLevel {
        if self.is_dominant(state) {
            BusLevel::Dominant
        } else {
            BusLevel::Recessive
        }
    }

    /// Map a bus level to the physical level that carries it
    pub fn bit_state(&self, level: BusLevel) -> BitState {
        match level {
            BusLevel::Dominant => self.dominant(),
            BusLevel::Recessive => self.recessive(),
        }
    }

    /// Lowest sample rate the decoder accepts for this bit rate
    pub fn minimum_sample_rate_hz(&self) -> u32 {
        self.bit_rate.hz() * 4
    }

    /// Check that a capture at `sample_rate_hz` can be decoded with this config
    pub fn validate(&self, sample_rate_hz: u32) -> Result<()> {
        if sample_rate_hz < self.minimum_sample_rate_hz() {
            return Err(DecoderError::InvalidConfig(format!(
                "sample rate {} Hz is below the minimum of {} Hz for {}",
                sample_rate_hz,
                self.minimum_sample_rate_hz(),
                self.bit_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .with_channel(3)
            .with_bit_rate(BitRate::Rate125K)
            .with_inverted(true);

        assert_eq!(config.channel, 3);
        assert_eq!(config.bit_rate.hz(), 125_000);
        assert!(config.inverted);
    }

    #[test]
    fn test_polarity_mapping() {
        let normal = DecoderConfig::new();
        assert_eq!(normal.dominant(), BitState::Low);
        assert_eq!(normal.recessive(), BitState::High);
        assert_eq!(normal.bus_level(BitState::Low), BusLevel::Dominant);

        let inverted = DecoderConfig::new().with_inverted(true);
        assert!(inverted.is_dominant(BitState::High));
        assert!(inverted.is_recessive(BitState::Low));
        assert_eq!(inverted.bit_state(BusLevel::Recessive), BitState::Low);
    }

    #[test]
    fn test_bit_rate_conversion() {
        assert_eq!(BitRate::try_from(250_000u32), Ok(BitRate::Rate250K));
        assert!(BitRate::try_from(1_000_000u32).is_err());
        assert_eq!(u32::from(BitRate::Rate500K), 500_000);
    }

    #[test]
    fn test_minimum_sample_rate() {
        let config = DecoderConfig::new();
        assert_eq!(config.minimum_sample_rate_hz(), 2_000_000);
        assert!(config.validate(2_000_000).is_ok());
        assert!(config.validate(1_999_999).is_err());
    }
}
