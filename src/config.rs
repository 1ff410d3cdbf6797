//! Controller configuration
//!
//! On hardware these values are fixed at build time. Here they form a
//! serde-backed struct with compile-time defaults that can also be loaded from
//! YAML:
//!
//! ```rust
//! use controlino::{BoardProfile, ControllerConfig};
//!
//! let config = ControllerConfig::from_yaml_str(
//!     "board: arduino_mega2560\npacket_rate_hz: 20\n",
//! ).unwrap();
//! assert_eq!(config.board, BoardProfile::ArduinoMega2560);
//! assert_eq!(config.max_channels(), 86);
//! assert_eq!(config.max_packet_size, 500);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::packet::{DATA_PACKET_HEADER_SIZE, DEFAULT_MAX_PACKET_SIZE};
use crate::types::{MAX_SAMPLING_RATE_HZ, SamplingRate};
use crate::{ControlinoError, Result};

/// Default packet rate in Hz.
pub const DEFAULT_PACKET_RATE_HZ: u32 = 10;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Largest pin count of either kind. Pin indices are `u8`.
pub const MAX_BOARD_PINS: usize = 256;

/// Target board, which fixes the number of registrable channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardProfile {
    ArduinoUno,
    #[default]
    ArduinoNano,
    ArduinoMega2560,
    Custom { digital_pins: usize, analog_inputs: usize },
}

impl BoardProfile {
    pub fn digital_pins(&self) -> usize {
        match self {
            BoardProfile::ArduinoUno | BoardProfile::ArduinoNano => 20,
            BoardProfile::ArduinoMega2560 => 70,
            BoardProfile::Custom { digital_pins, .. } => *digital_pins,
        }
    }

    pub fn analog_inputs(&self) -> usize {
        match self {
            BoardProfile::ArduinoUno => 6,
            BoardProfile::ArduinoNano => 8,
            BoardProfile::ArduinoMega2560 => 16,
            BoardProfile::Custom { analog_inputs, .. } => *analog_inputs,
        }
    }
}

/// Settings consumed by the scheduler at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    #[serde(with = "serde_yaml_ng::with::singleton_map")]
    pub board: BoardProfile,
    /// Outgoing data packets per second
    pub packet_rate_hz: u32,
    /// Size of the reusable packet buffer in bytes
    pub max_packet_size: usize,
    /// Serial link speed, used by the transport only
    pub baud_rate: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            board: BoardProfile::default(),
            packet_rate_hz: DEFAULT_PACKET_RATE_HZ,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ControllerConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!("Loaded controller config: {:?}", config);
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ControlinoError::io_error(format!("reading {}", path.display()), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_rate_hz == 0 || self.packet_rate_hz > MAX_SAMPLING_RATE_HZ {
            return Err(ControlinoError::config_error(format!(
                "packet_rate_hz must be between 1 and {}, got {}",
                MAX_SAMPLING_RATE_HZ, self.packet_rate_hz
            )));
        }

        if self.max_packet_size < DATA_PACKET_HEADER_SIZE || self.max_packet_size > u16::MAX as usize
        {
            return Err(ControlinoError::config_error(format!(
                "max_packet_size must be between {} and {}, got {}",
                DATA_PACKET_HEADER_SIZE,
                u16::MAX,
                self.max_packet_size
            )));
        }

        let (digital, analog) = (self.board.digital_pins(), self.board.analog_inputs());
        if digital > MAX_BOARD_PINS || analog > MAX_BOARD_PINS {
            return Err(ControlinoError::config_error(format!(
                "boards have at most {} pins of each kind, got {} digital and {} analog",
                MAX_BOARD_PINS, digital, analog
            )));
        }

        if self.max_channels() == 0 {
            return Err(ControlinoError::config_error("board has no pins"));
        }

        Ok(())
    }

    /// Upper bound on registered channels: digital pins plus analog inputs.
    pub fn max_channels(&self) -> usize {
        self.board.digital_pins().saturating_add(self.board.analog_inputs())
    }

    pub fn packet_rate(&self) -> Result<SamplingRate> {
        SamplingRate::new(self.packet_rate_hz).map_err(|_| {
            ControlinoError::config_error(format!("invalid packet rate {}", self.packet_rate_hz))
        })
    }

    /// Packet period in milliseconds.
    pub fn packet_period_ms(&self) -> Result<u32> {
        Ok(self.packet_rate()?.period_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_nano_build() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_channels(), 28);
        assert_eq!(config.packet_period_ms().unwrap(), 100);
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn custom_board_from_yaml() {
        let yaml = "board:\n  custom:\n    digital_pins: 4\n    analog_inputs: 2\nmax_packet_size: 64\n";
        let config = ControllerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_channels(), 6);
        assert_eq!(config.max_packet_size, 64);
        assert_eq!(config.packet_rate_hz, DEFAULT_PACKET_RATE_HZ);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ControllerConfig::from_yaml_str("packet_rate_hz: 0\n").is_err());
        assert!(ControllerConfig::from_yaml_str("packet_rate_hz: 5000\n").is_err());
        assert!(ControllerConfig::from_yaml_str("max_packet_size: 8\n").is_err());
        assert!(
            ControllerConfig::from_yaml_str(
                "board:\n  custom:\n    digital_pins: 0\n    analog_inputs: 0\n"
            )
            .is_err()
        );
        assert!(matches!(
            ControllerConfig::from_yaml_str(
                "board:\n  custom:\n    digital_pins: 4611686018427387903\n    analog_inputs: 1\n"
            ),
            Err(ControlinoError::Config { .. })
        ));
        assert!(
            ControllerConfig::from_yaml_str(
                "board:\n  custom:\n    digital_pins: 20\n    analog_inputs: 257\n"
            )
            .is_err()
        );
        assert!(matches!(
            ControllerConfig::from_yaml_str("board: [1, 2]\n"),
            Err(ControlinoError::Config { .. })
        ));
    }

    #[test]
    fn pin_counts_at_the_bound_are_accepted() {
        let config = ControllerConfig {
            board: BoardProfile::Custom { digital_pins: MAX_BOARD_PINS, analog_inputs: MAX_BOARD_PINS },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.max_channels(), 512);

        let huge = BoardProfile::Custom { digital_pins: usize::MAX, analog_inputs: usize::MAX };
        let config = ControllerConfig { board: huge, ..Default::default() };
        assert_eq!(config.max_channels(), usize::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ControllerConfig::from_path("/nonexistent/controlino.yaml").unwrap_err();
        assert!(matches!(err, ControlinoError::Io { .. }));
    }

    #[test]
    fn serializes_back_to_yaml() {
        let config = ControllerConfig { board: BoardProfile::ArduinoUno, ..Default::default() };
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        assert_eq!(ControllerConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
