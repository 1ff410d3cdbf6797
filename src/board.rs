//! Hardware seam: per-pin primitives and their dispatch by channel kind
//!
//! The [`Board`] trait is the only place that touches pins. [`ChannelKind`] maps the
//! generic read/write/direction operations onto it, returning `None` or
//! [`ControlinoError::UnsupportedOperation`] for capabilities a kind lacks.

use tracing::trace;

use crate::types::{ChannelKind, Direction};
use crate::{ControlinoError, Result};

/// Largest number of values accepted by a single write.
pub const MAX_WRITE_VALUES: usize = 10;

/// Highest PWM duty value.
pub const PWM_DUTY_MAX: u32 = 255;

/// Per-pin hardware primitives.
pub trait Board {
    fn analog_read(&mut self, pin: u8) -> u32;

    fn digital_read(&mut self, pin: u8) -> u32;

    fn digital_write(&mut self, pin: u8, value: u32);

    fn pwm_write(&mut self, pin: u8, duty: u32);

    fn set_direction(&mut self, pin: u8, direction: Direction);
}

impl ChannelKind {
    /// Read one datapoint, or `None` if this kind cannot be read.
    pub fn read<B: Board + ?Sized>(&self, board: &mut B, index: u8) -> Option<u32> {
        match self {
            ChannelKind::Analog => Some(board.analog_read(index)),
            ChannelKind::Digital => Some(board.digital_read(index)),
            ChannelKind::Pwm | ChannelKind::Bus => None,
        }
    }

    /// Write values to a channel. Pins use the first value only.
    pub fn write<B: Board + ?Sized>(&self, board: &mut B, index: u8, values: &[u32]) -> Result<()> {
        if values.is_empty() || values.len() > MAX_WRITE_VALUES {
            return Err(ControlinoError::invalid_argument(
                "CH:WRITE",
                format!("expected 1 to {} values, got {}", MAX_WRITE_VALUES, values.len()),
            ));
        }

        match self {
            ChannelKind::Digital => board.digital_write(index, values[0]),
            ChannelKind::Pwm => board.pwm_write(index, values[0].min(PWM_DUTY_MAX)),
            ChannelKind::Analog | ChannelKind::Bus => {
                return Err(ControlinoError::UnsupportedOperation {
                    tag: self.tag(),
                    operation: "write",
                });
            }
        }

        trace!("Wrote {:?} to {}{}", values, self.tag(), index);
        Ok(())
    }

    pub fn set_direction<B: Board + ?Sized>(
        &self,
        board: &mut B,
        index: u8,
        direction: Direction,
    ) -> Result<()> {
        if !self.can_set_direction() {
            return Err(ControlinoError::UnsupportedOperation {
                tag: self.tag(),
                operation: "direction",
            });
        }
        board.set_direction(index, direction);
        Ok(())
    }
}

/// In-memory board used by the simulator and tests.
///
/// Digital pins hold whatever was last written. Analog pins return a fixed value if
/// one was set, otherwise a triangle wave over 0..=1023 that advances on every read.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    digital: Vec<u32>,
    pwm: Vec<u32>,
    directions: Vec<Direction>,
    analog: Vec<Option<u32>>,
    analog_reads: Vec<u32>,
}

impl SimulatedBoard {
    pub fn new(digital_pins: usize, analog_inputs: usize) -> Self {
        Self {
            digital: vec![0; digital_pins],
            pwm: vec![0; digital_pins],
            directions: vec![Direction::Input; digital_pins],
            analog: vec![None; analog_inputs],
            analog_reads: vec![0; analog_inputs],
        }
    }

    /// Pin a fixed analog value.
    pub fn set_analog(&mut self, pin: u8, value: u32) {
        if let Some(slot) = self.analog.get_mut(pin as usize) {
            *slot = Some(value);
        }
    }

    /// Drive a digital input from outside.
    pub fn set_digital(&mut self, pin: u8, value: u32) {
        if let Some(slot) = self.digital.get_mut(pin as usize) {
            *slot = value;
        }
    }

    pub fn pwm_duty(&self, pin: u8) -> Option<u32> {
        self.pwm.get(pin as usize).copied()
    }

    pub fn direction(&self, pin: u8) -> Option<Direction> {
        self.directions.get(pin as usize).copied()
    }
}

impl Board for SimulatedBoard {
    fn analog_read(&mut self, pin: u8) -> u32 {
        let pin = pin as usize;
        match self.analog.get(pin) {
            Some(Some(value)) => *value,
            Some(None) => {
                let step = self.analog_reads[pin];
                self.analog_reads[pin] = step.wrapping_add(1);
                let phase = (step.wrapping_mul(64)) % 2046;
                if phase <= 1023 { phase } else { 2046 - phase }
            }
            None => 0,
        }
    }

    fn digital_read(&mut self, pin: u8) -> u32 {
        self.digital.get(pin as usize).map(|v| u32::from(*v != 0)).unwrap_or(0)
    }

    fn digital_write(&mut self, pin: u8, value: u32) {
        if let Some(slot) = self.digital.get_mut(pin as usize) {
            *slot = u32::from(value != 0);
        }
    }

    fn pwm_write(&mut self, pin: u8, duty: u32) {
        if let Some(slot) = self.pwm.get_mut(pin as usize) {
            *slot = duty;
        }
    }

    fn set_direction(&mut self, pin: u8, direction: Direction) {
        if let Some(slot) = self.directions.get_mut(pin as usize) {
            *slot = direction;
        }
    }
}
