//! Channel kind definitions

use serde::{Deserialize, Serialize};

/// Number of bytes used by one datapoint of a channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatapointWidth {
    /// Every channel of this kind uses the same width
    Fixed(usize),
    /// Width depends on the attached device and is given at registration (bus channels)
    AtRegistration,
}

/// The physical kinds of channel a controller exposes.
///
/// Each kind has a single-character tag used on the command line and a subset
/// of read/write/direction capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Analog input pin (10-bit ADC, two bytes per datapoint)
    Analog,
    /// Digital I/O pin (one byte per datapoint)
    Digital,
    /// PWM output pin
    Pwm,
    /// Bus device such as I2C
    Bus,
}

impl ChannelKind {
    /// All kinds, in tag order.
    pub const ALL: [ChannelKind; 4] =
        [ChannelKind::Analog, ChannelKind::Digital, ChannelKind::Pwm, ChannelKind::Bus];

    /// The single-character tag for this kind.
    pub const fn tag(&self) -> char {
        match self {
            ChannelKind::Analog => 'A',
            ChannelKind::Digital => 'D',
            ChannelKind::Pwm => 'P',
            ChannelKind::Bus => 'I',
        }
    }

    /// Look up a kind by its tag. Tags are case-insensitive.
    pub fn from_tag(tag: char) -> Option<ChannelKind> {
        let tag = tag.to_ascii_uppercase();
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub const fn datapoint_width(&self) -> DatapointWidth {
        match self {
            ChannelKind::Analog | ChannelKind::Pwm => DatapointWidth::Fixed(2),
            ChannelKind::Digital => DatapointWidth::Fixed(1),
            ChannelKind::Bus => DatapointWidth::AtRegistration,
        }
    }

    pub const fn can_read(&self) -> bool {
        matches!(self, ChannelKind::Analog | ChannelKind::Digital)
    }

    pub const fn can_write(&self) -> bool {
        matches!(self, ChannelKind::Digital | ChannelKind::Pwm)
    }

    pub const fn can_set_direction(&self) -> bool {
        matches!(self, ChannelKind::Digital)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Direction of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl std::str::FromStr for Direction {
    type Err = crate::ControlinoError;

    fn from_str(s: &str) -> crate::Result<Self> {
        if s.eq_ignore_ascii_case("in") {
            Ok(Direction::Input)
        } else if s.eq_ignore_ascii_case("out") {
            Ok(Direction::Output)
        } else {
            Err(crate::ControlinoError::invalid_argument(
                "CH:DIR",
                format!("direction must be IN or OUT, got '{}'", s),
            ))
        }
    }
}
