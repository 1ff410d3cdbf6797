//! Sampling rate and the schedule values derived from it

use serde::{Deserialize, Serialize};

use crate::{ControlinoError, Result};

/// Highest rate that still yields a non-zero millisecond period.
pub const MAX_SAMPLING_RATE_HZ: u32 = 1000;

/// A validated sampling rate in Hz (1..=1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SamplingRate(u32);

impl SamplingRate {
    pub fn new(hz: u32) -> Result<Self> {
        if hz == 0 || hz > MAX_SAMPLING_RATE_HZ {
            return Err(ControlinoError::InvalidSamplingRate { rate: hz });
        }
        Ok(Self(hz))
    }

    pub fn hz(self) -> u32 {
        self.0
    }

    /// Period in milliseconds, rounded toward zero.
    pub fn period_ms(self) -> u32 {
        1000 / self.0
    }

    /// Datapoints accumulated between two packets: `ceil(self / packet_rate)`, at least 1.
    pub fn capacity_per_packet(self, packet_rate: SamplingRate) -> usize {
        self.0.div_ceil(packet_rate.0).max(1) as usize
    }
}

impl TryFrom<u32> for SamplingRate {
    type Error = ControlinoError;

    fn try_from(hz: u32) -> Result<Self> {
        Self::new(hz)
    }
}

impl From<SamplingRate> for u32 {
    fn from(rate: SamplingRate) -> u32 {
        rate.0
    }
}
