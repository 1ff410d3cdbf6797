//! Host-side framing of a telemetry byte stream
//!
//! The link has no acknowledgement or retransmission, so the reader resynchronises
//! on the sync constant: bytes before it are discarded, a packet is only taken
//! once its declared length has arrived, and packets that fail to decode are
//! skipped.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

use super::{COMMON_HEADER_SIZE, DecodedPacket, SYNC, decode_packet};
use crate::ControlinoError;

/// Incremental reader fed with arbitrary slices of the byte stream.
///
/// ```rust
/// use controlino::packet::{DecodedPacket, PacketBuffer, PacketReader};
///
/// let mut buffer = PacketBuffer::new(64);
/// let pong = buffer.write_string_packet("PONG").unwrap().to_vec();
///
/// let mut reader = PacketReader::new();
/// assert!(reader.process_bytes(&pong[..5]).is_empty());
/// let packets = reader.process_bytes(&pong[5..]);
/// assert_eq!(packets, vec![DecodedPacket::String("PONG".to_string())]);
/// ```
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: BytesMut,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every packet they complete.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Vec<DecodedPacket> {
        self.buffer.extend_from_slice(bytes);

        let mut packets = Vec::new();
        while let Some(packet) = next_packet(&mut self.buffer) {
            packets.push(packet);
        }
        packets
    }

    /// Bytes held while waiting for the rest of a packet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// [`Decoder`] for use with `FramedRead` over an async byte source.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = DecodedPacket;
    type Error = ControlinoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_packet(src))
    }
}

fn next_packet(buf: &mut BytesMut) -> Option<DecodedPacket> {
    loop {
        let frame = take_frame(buf)?;
        match decode_packet(&frame) {
            Ok(packet) => return Some(packet),
            Err(e) => warn!("Skipping undecodable packet ({} bytes): {}", frame.len(), e),
        }
    }
}

fn take_frame(buf: &mut BytesMut) -> Option<BytesMut> {
    loop {
        match buf.windows(SYNC.len()).position(|w| w == SYNC) {
            Some(0) => {}
            Some(start) => {
                trace!("Discarding {} bytes before sync", start);
                buf.advance(start);
            }
            None => {
                // Keep a tail that may be the start of a split sync constant
                let keep = buf.len().min(SYNC.len() - 1);
                buf.advance(buf.len() - keep);
                return None;
            }
        }

        if buf.len() < COMMON_HEADER_SIZE {
            return None;
        }

        let length = u16::from_le_bytes([buf[5], buf[6]]) as usize;
        if length < COMMON_HEADER_SIZE {
            warn!("Packet declares impossible length {}, resyncing", length);
            buf.advance(1);
            continue;
        }
        if buf.len() < length {
            return None;
        }

        return Some(buf.split_to(length));
    }
}
