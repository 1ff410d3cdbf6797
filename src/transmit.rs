//! Packet transmitters
//!
//! A transmitter hands each finished packet to the link exactly once. There is no
//! queueing, retry or acknowledgement; a short write is logged and the rest of the
//! packet is lost.

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::{ControlinoError, Result};

/// Sink for finished packets.
pub trait Transmitter {
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Writes packets to a serial port or any other [`std::io::Write`].
#[derive(Debug)]
pub struct SerialTransmitter<W> {
    port: W,
}

impl<W: std::io::Write> SerialTransmitter<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }

    pub fn into_inner(self) -> W {
        self.port
    }
}

impl<W: std::io::Write> Transmitter for SerialTransmitter<W> {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        let written = self
            .port
            .write(packet)
            .map_err(|e| ControlinoError::io_error("serial packet write", e))?;
        if written < packet.len() {
            warn!("Short serial write: {} of {} bytes", written, packet.len());
        }
        self.port.flush().map_err(|e| ControlinoError::io_error("serial flush", e))?;
        trace!("Sent {} byte packet", written);
        Ok(())
    }
}

/// Forwards packets into a tokio channel. Packets are dropped when the channel is full.
#[derive(Debug, Clone)]
pub struct ChannelTransmitter {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelTransmitter {
    /// Create the transmitter and the receiving end holding up to `capacity` packets.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Transmitter for ChannelTransmitter {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        match self.tx.try_send(packet.to_vec()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Packet channel full, dropping {} byte packet", packet.len());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ControlinoError::io_error(
                "packet channel",
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "receiver dropped"),
            )),
        }
    }
}

/// Keeps every packet in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransmitter {
    packets: Vec<Vec<u8>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.packets)
    }
}

impl Transmitter for RecordingTransmitter {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.packets.push(packet.to_vec());
        Ok(())
    }
}
