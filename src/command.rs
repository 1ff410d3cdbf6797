//! Host command surface
//!
//! Commands arrive as carriage-return terminated ASCII lines on the serial link.
//! [`CommandReader`] assembles lines from raw bytes, [`Command`] parses one line
//! and [`Command::apply`] runs it against a [`Scheduler`].
//!
//! | Line | Effect |
//! |---|---|
//! | `RTC:ZERO` | start a session |
//! | `RTC:STOP` | stop the session |
//! | `PING` | string packet `PONG` |
//! | `DIAG` | string packet with the missed sample/packet counters |
//! | `CH:READ <tag><index> [rate] [bytes]` | register a channel; without a rate, read it once |
//! | `CH:DIR <tag><index> IN\|OUT` | set a pin direction |
//! | `CH:WRITE <tag><index> v1 [v2 ...]` | write to a pin |
//!
//! ```rust
//! use controlino::command::{Command, CommandReader};
//!
//! let mut reader = CommandReader::new();
//! let lines = reader.process_bytes(b"CH:READ A0 50\r\nPING\r");
//! assert_eq!(lines, vec!["CH:READ A0 50", "PING"]);
//!
//! let command: Command = lines[0].parse().unwrap();
//! assert!(matches!(command, Command::Read { tag: 'A', index: 0, rate_hz: Some(50), .. }));
//! ```

use std::str::FromStr;
use tracing::{debug, trace, warn};

use crate::board::{Board, MAX_WRITE_VALUES};
use crate::clock::Clock;
use crate::registry::ChannelRequest;
use crate::scheduler::Scheduler;
use crate::transmit::Transmitter;
use crate::types::Direction;
use crate::{ControlinoError, Result};

/// Size of the command line buffer.
pub const COMMAND_BUFFER_SIZE: usize = 64;

const TERMINATOR: u8 = b'\r';

/// Splits a byte stream into command lines.
///
/// Only printable ASCII is kept. Characters past the buffer size are dropped
/// until the next terminator.
#[derive(Debug)]
pub struct CommandReader {
    buffer: Vec<u8>,
    truncated: bool,
}

impl Default for CommandReader {
    fn default() -> Self {
        Self { buffer: Vec::with_capacity(COMMAND_BUFFER_SIZE), truncated: false }
    }
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returning a line when it completes one.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if byte == TERMINATOR {
            if self.truncated {
                warn!("Command longer than {} bytes was truncated", COMMAND_BUFFER_SIZE);
                self.truncated = false;
            }
            let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
            self.buffer.clear();
            return (!line.is_empty()).then_some(line);
        }

        if !(0x20..=0x7E).contains(&byte) {
            return None;
        }

        if self.buffer.len() < COMMAND_BUFFER_SIZE {
            self.buffer.push(byte);
        } else {
            self.truncated = true;
        }
        None
    }

    /// Feed a slice, returning every completed line.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

/// A parsed host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartSession,
    StopSession,
    Ping,
    Diag,
    /// Register a channel. Without a rate the channel is read once, at the next
    /// packet boundary.
    Read { tag: char, index: u8, rate_hz: Option<u32>, byte_width: Option<usize> },
    Direction { tag: char, index: u8, direction: Direction },
    Write { tag: char, index: u8, values: Vec<u32> },
}

impl FromStr for Command {
    type Err = ControlinoError;

    fn from_str(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match name.to_ascii_uppercase().as_str() {
            "RTC:ZERO" => Ok(Command::StartSession),
            "RTC:STOP" => Ok(Command::StopSession),
            "PING" => Ok(Command::Ping),
            "DIAG" => Ok(Command::Diag),
            "CH:READ" => {
                const CMD: &str = "CH:READ";
                if args.is_empty() || args.len() > 3 {
                    return Err(ControlinoError::invalid_argument(
                        CMD,
                        "usage: CH:READ <channel> [rate] [bytes]",
                    ));
                }
                let (tag, index) = parse_channel(CMD, args[0])?;
                let rate_hz = args.get(1).map(|s| parse_number(CMD, "rate", s)).transpose()?;
                let byte_width = args.get(2).map(|s| parse_number(CMD, "bytes", s)).transpose()?;
                Ok(Command::Read { tag, index, rate_hz, byte_width })
            }
            "CH:DIR" => {
                const CMD: &str = "CH:DIR";
                let [channel, direction] = args[..] else {
                    return Err(ControlinoError::invalid_argument(
                        CMD,
                        "usage: CH:DIR <channel> IN|OUT",
                    ));
                };
                let (tag, index) = parse_channel(CMD, channel)?;
                Ok(Command::Direction { tag, index, direction: direction.parse()? })
            }
            "CH:WRITE" => {
                const CMD: &str = "CH:WRITE";
                let Some((channel, values)) = args.split_first() else {
                    return Err(ControlinoError::invalid_argument(
                        CMD,
                        "usage: CH:WRITE <channel> v1 [v2 ...]",
                    ));
                };
                if values.is_empty() || values.len() > MAX_WRITE_VALUES {
                    return Err(ControlinoError::invalid_argument(
                        CMD,
                        format!("expected 1 to {} values, got {}", MAX_WRITE_VALUES, values.len()),
                    ));
                }
                let (tag, index) = parse_channel(CMD, channel)?;
                let values = values
                    .iter()
                    .map(|s| parse_number(CMD, "value", s))
                    .collect::<Result<Vec<u32>>>()?;
                Ok(Command::Write { tag, index, values })
            }
            _ => Err(ControlinoError::UnknownCommand { command: line.to_string() }),
        }
    }
}

/// Split `A0`, `D13` and the like into a type tag and pin index.
fn parse_channel(command: &str, token: &str) -> Result<(char, u8)> {
    let mut chars = token.chars();
    let tag = chars
        .next()
        .ok_or_else(|| ControlinoError::invalid_argument(command, "missing channel"))?;
    let index = chars.as_str().parse::<u8>().map_err(|_| {
        ControlinoError::invalid_argument(command, format!("invalid channel '{}'", token))
    })?;
    Ok((tag.to_ascii_uppercase(), index))
}

fn parse_number<N: FromStr>(command: &str, what: &str, token: &str) -> Result<N> {
    token.parse().map_err(|_| {
        ControlinoError::invalid_argument(command, format!("invalid {} '{}'", what, token))
    })
}

impl Command {
    /// Execute against the scheduler.
    pub fn apply<B, C, T>(self, scheduler: &mut Scheduler<B, C, T>) -> Result<()>
    where
        B: Board,
        C: Clock,
        T: Transmitter,
    {
        match self {
            Command::StartSession => scheduler.start_session(),
            Command::StopSession => scheduler.stop_session(),
            Command::Ping => scheduler.send_string("PONG")?,
            Command::Diag => {
                let counters = scheduler.counters();
                let report = format!(
                    "MISSED_SAMPLES={} MISSED_PACKETS={}",
                    counters.missed_samples, counters.missed_packets
                );
                scheduler.send_string(&report)?;
            }
            Command::Read { tag, index, rate_hz, byte_width } => {
                match rate_hz {
                    Some(rate_hz) => {
                        scheduler.register(ChannelRequest { tag, index, rate_hz, byte_width })?;
                    }
                    None => {
                        let rate_hz = scheduler.config().packet_rate_hz;
                        scheduler.register_once(ChannelRequest { tag, index, rate_hz, byte_width })?;
                    }
                }
            }
            Command::Direction { tag, index, direction } => {
                scheduler.set_direction(tag, index, direction)?;
            }
            Command::Write { tag, index, values } => {
                scheduler.write_channel(tag, index, &values)?;
            }
        }
        Ok(())
    }
}

/// Parse and run one line. Failures are logged and the line is dropped.
pub fn dispatch_line<B, C, T>(line: &str, scheduler: &mut Scheduler<B, C, T>) -> Result<()>
where
    B: Board,
    C: Clock,
    T: Transmitter,
{
    trace!("Command line: {:?}", line);
    let result = line.parse::<Command>().and_then(|command| {
        debug!("Dispatching {:?}", command);
        command.apply(scheduler)
    });

    if let Err(e) = &result {
        warn!("Command '{}' failed: {}", line, e);
    }
    result
}
