//! Serial I/O controller core: periodic channel sampling and binary telemetry packets.
//!
//! Controlino turns a board's analog, digital, PWM and bus pins into a stream of
//! fixed-format telemetry packets. The host registers channels with a sampling rate,
//! starts a session, and receives one data packet per packet period carrying every
//! channel block that filled up since the last packet.
//!
//! # Features
//!
//! - **Per-channel scheduling**: independent sampling rates on a wrapping 32-bit millisecond clock
//! - **Slip recovery**: missed deadlines are counted and every channel resynchronised to a packet boundary
//! - **Bit-exact wire format**: explicit header serialization plus a symmetric decoder
//! - **Host commands**: the ASCII command set for sessions, registration, pin direction and writes
//! - **Async driver**: a tokio poll loop fed by raw serial bytes
//!
//! # Quick Start
//!
//! ```rust
//! use controlino::{ControllerConfig, Scheduler};
//! use controlino::board::SimulatedBoard;
//! use controlino::clock::ManualClock;
//! use controlino::registry::ChannelRequest;
//! use controlino::transmit::RecordingTransmitter;
//!
//! # fn main() -> controlino::Result<()> {
//! let clock = ManualClock::new(0);
//! let mut scheduler = Scheduler::new(
//!     ControllerConfig::default(),
//!     SimulatedBoard::new(20, 8),
//!     clock.clone(),
//!     RecordingTransmitter::new(),
//! )?;
//!
//! scheduler.register(ChannelRequest { tag: 'A', index: 0, rate_hz: 40, byte_width: None })?;
//! scheduler.start_session();
//!
//! for _ in 0..=201 {
//!     scheduler.poll()?;
//!     clock.advance(1);
//! }
//! assert_eq!(scheduler.transmitter().packets().len(), 2);
//! # Ok(())
//! # }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Configuration and hardware seams
pub mod board;
pub mod clock;
pub mod config;

// Acquisition
pub mod registry;
pub mod sampler;
pub mod scheduler;

// Wire and transport
pub mod command;
pub mod driver;
pub mod packet;
pub mod transmit;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{BoardProfile, ControllerConfig};
pub use driver::{Driver, DriverHandle};
pub use registry::{ChannelId, ChannelRegistry, ChannelRequest};
pub use scheduler::{AcquisitionCounters, PollReport, Scheduler};
