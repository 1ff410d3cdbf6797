//! Packet serialization into a reusable buffer, and the matching decoder
//!
//! Fields are written at explicit offsets; nothing is cast over the buffer.
//!
//! ```text
//! offset  size  field
//! 0       4     sync constant
//! 4       1     packet type
//! 5       2     total packet length (LE)
//! 7       4     relative timestamp in ms (LE)      data packets only
//! 11      2     block count (LE)                   data packets only
//! 13      ...   blocks: [id, 1][length, 2 LE][payload]
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    COMMON_HEADER_SIZE, DATA_BLOCK_HEADER_SIZE, DATA_PACKET_HEADER_SIZE, PacketType, SYNC,
};
use crate::types::Millis;
use crate::{ControlinoError, Result};

const TYPE_OFFSET: usize = 4;
const LENGTH_OFFSET: usize = 5;
const TIMESTAMP_OFFSET: usize = 7;
const BLOCK_COUNT_OFFSET: usize = 11;

/// Fixed-capacity byte buffer reused for every outgoing packet.
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    bytes: Box<[u8]>,
    len: usize,
    block_count: u16,
}

impl PacketBuffer {
    /// Allocate a buffer of `capacity` bytes. Capacity is raised to at least the
    /// size of an empty data packet and capped at the largest length the `u16`
    /// header field can carry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(DATA_PACKET_HEADER_SIZE, u16::MAX as usize);
        Self { bytes: vec![0; capacity].into_boxed_slice(), len: 0, block_count: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes still free after the current write cursor.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.len
    }

    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    /// The packet written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Reset the buffer and write the headers of an empty data packet.
    pub fn begin_data_packet(&mut self, timestamp: Millis) {
        self.write_common_header(PacketType::Data);
        put_u32_le(&mut self.bytes, TIMESTAMP_OFFSET, timestamp);
        put_u16_le(&mut self.bytes, BLOCK_COUNT_OFFSET, 0);
        self.len = DATA_PACKET_HEADER_SIZE;
        self.block_count = 0;
    }

    /// Append one data block behind its sub-header.
    pub fn push_block(&mut self, channel_id: u8, payload: &[u8]) -> Result<()> {
        let required = DATA_BLOCK_HEADER_SIZE + payload.len();
        if required > self.remaining() || payload.len() > u16::MAX as usize {
            return Err(ControlinoError::PacketOverflow {
                required: self.len + required,
                capacity: self.capacity(),
            });
        }

        let start = self.len;
        self.bytes[start] = channel_id;
        put_u16_le(&mut self.bytes, start + 1, payload.len() as u16);
        self.bytes[start + DATA_BLOCK_HEADER_SIZE..start + required].copy_from_slice(payload);

        self.len += required;
        self.block_count += 1;
        Ok(())
    }

    /// Write the final length and block count and return the packet bytes.
    pub fn finish(&mut self) -> &[u8] {
        put_u16_le(&mut self.bytes, LENGTH_OFFSET, self.len as u16);
        put_u16_le(&mut self.bytes, BLOCK_COUNT_OFFSET, self.block_count);
        trace!("Finished data packet: {} bytes, {} blocks", self.len, self.block_count);
        self.as_bytes()
    }

    /// Overwrite the buffer with a string packet.
    pub fn write_string_packet(&mut self, text: &str) -> Result<&[u8]> {
        let total = COMMON_HEADER_SIZE + text.len();
        if total > self.capacity() {
            return Err(ControlinoError::PacketOverflow { required: total, capacity: self.capacity() });
        }

        self.write_common_header(PacketType::String);
        self.bytes[COMMON_HEADER_SIZE..total].copy_from_slice(text.as_bytes());
        put_u16_le(&mut self.bytes, LENGTH_OFFSET, total as u16);
        self.len = total;
        self.block_count = 0;
        Ok(self.as_bytes())
    }

    fn write_common_header(&mut self, packet_type: PacketType) {
        self.bytes[..SYNC.len()].copy_from_slice(&SYNC);
        self.bytes[TYPE_OFFSET] = packet_type as u8;
        put_u16_le(&mut self.bytes, LENGTH_OFFSET, 0);
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedPacket {
    Data(DataPacket),
    String(String),
}

/// A decoded data packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    /// Milliseconds since the session origin when the packet was assembled
    pub timestamp_ms: u32,
    pub blocks: Vec<DataBlock>,
}

/// One channel's datapoints from a data packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    pub channel_id: u8,
    pub payload: Vec<u8>,
}

impl DataBlock {
    /// Split the payload into big-endian datapoints of `width` bytes.
    ///
    /// Datapoints wider than four bytes keep their low 32 bits.
    pub fn datapoints(&self, width: usize) -> Result<Vec<u32>> {
        if width == 0 || self.payload.len() % width != 0 {
            return Err(ControlinoError::parse_error(
                "data block",
                format!("{} byte payload is not a multiple of width {}", self.payload.len(), width),
            ));
        }

        Ok(self
            .payload
            .chunks_exact(width)
            .map(|chunk| chunk.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)) as u32)
            .collect())
    }
}

/// Decode one complete packet.
///
/// The slice must hold exactly the declared packet length.
pub fn decode_packet(bytes: &[u8]) -> Result<DecodedPacket> {
    if bytes.len() < COMMON_HEADER_SIZE {
        return Err(ControlinoError::parse_error(
            "packet header",
            format!("need {} bytes, have {}", COMMON_HEADER_SIZE, bytes.len()),
        ));
    }
    if bytes[..SYNC.len()] != SYNC {
        return Err(ControlinoError::parse_error("packet header", "missing sync constant"));
    }

    let packet_type = PacketType::try_from(bytes[TYPE_OFFSET])?;
    let declared = read_u16_le(bytes, LENGTH_OFFSET)? as usize;
    if declared != bytes.len() {
        return Err(ControlinoError::parse_error(
            "packet header",
            format!("declared length {} but got {} bytes", declared, bytes.len()),
        ));
    }

    match packet_type {
        PacketType::String => Ok(DecodedPacket::String(
            String::from_utf8_lossy(&bytes[COMMON_HEADER_SIZE..]).into_owned(),
        )),
        PacketType::Data => decode_data_packet(bytes).map(DecodedPacket::Data),
    }
}

fn decode_data_packet(bytes: &[u8]) -> Result<DataPacket> {
    let timestamp_ms = read_u32_le(bytes, TIMESTAMP_OFFSET)?;
    let block_count = read_u16_le(bytes, BLOCK_COUNT_OFFSET)?;

    let mut blocks = Vec::with_capacity(block_count as usize);
    let mut offset = DATA_PACKET_HEADER_SIZE;
    for i in 0..block_count {
        let channel_id = *bytes.get(offset).ok_or_else(|| {
            ControlinoError::parse_error(format!("data block {}", i), "truncated block header")
        })?;
        let length = read_u16_le(bytes, offset + 1)? as usize;
        let start = offset + DATA_BLOCK_HEADER_SIZE;
        let payload = bytes.get(start..start + length).ok_or_else(|| {
            ControlinoError::parse_error(
                format!("data block {}", i),
                format!("{} byte payload runs past the packet end", length),
            )
        })?;

        blocks.push(DataBlock { channel_id, payload: payload.to_vec() });
        offset = start + length;
    }

    if offset != bytes.len() {
        return Err(ControlinoError::parse_error(
            "data packet",
            format!("{} trailing bytes after {} blocks", bytes.len() - offset, block_count),
        ));
    }

    Ok(DataPacket { timestamp_ms, blocks })
}

fn put_u16_le(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset..offset + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(ControlinoError::parse_error(
            "u16 field",
            format!("need 2 bytes at offset {}, have {}", offset, data.len().saturating_sub(offset)),
        )),
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    match data.get(offset..offset + 4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ControlinoError::parse_error(
            "u32 field",
            format!("need 4 bytes at offset {}, have {}", offset, data.len().saturating_sub(offset)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn empty_data_packet_layout() {
        let mut buffer = PacketBuffer::new(500);
        buffer.begin_data_packet(0x0102_0304);
        let bytes = buffer.finish();

        assert_eq!(
            bytes,
            &[0xA5, 0xA5, 0xA5, 0xA5, 0x00, 13, 0, 0x04, 0x03, 0x02, 0x01, 0, 0]
        );
    }

    #[test]
    fn capacity_is_capped_at_the_length_field() {
        assert_eq!(PacketBuffer::new(0).capacity(), DATA_PACKET_HEADER_SIZE);

        let mut buffer = PacketBuffer::new(100_000);
        assert_eq!(buffer.capacity(), u16::MAX as usize);

        buffer.begin_data_packet(0);
        let payload = vec![0xEE; 60_000];
        buffer.push_block(1, &payload).unwrap();
        assert!(buffer.push_block(2, &payload).is_err());

        let bytes = buffer.finish().to_vec();
        let DecodedPacket::Data(packet) = decode_packet(&bytes).unwrap() else {
            panic!("Expected data packet");
        };
        assert_eq!(u16::from_le_bytes([bytes[5], bytes[6]]) as usize, bytes.len());
        assert_eq!(packet.blocks.len(), 1);
    }

    #[test]
    fn block_layout_follows_headers() {
        let mut buffer = PacketBuffer::new(64);
        buffer.begin_data_packet(250);
        buffer.push_block(13, &[0x03, 0xFF]).unwrap();
        let bytes = buffer.finish().to_vec();

        assert_eq!(bytes.len(), 13 + 3 + 2);
        assert_eq!(&bytes[5..7], &[18, 0]);
        assert_eq!(&bytes[11..13], &[1, 0]);
        assert_eq!(&bytes[13..], &[13, 2, 0, 0x03, 0xFF]);
    }

    #[test]
    fn string_packet_round_trip() {
        let mut buffer = PacketBuffer::new(64);
        let bytes = buffer.write_string_packet("PONG").unwrap().to_vec();

        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[4], PacketType::String as u8);
        assert_eq!(decode_packet(&bytes).unwrap(), DecodedPacket::String("PONG".to_string()));
    }

    #[test]
    fn overflow_is_reported_not_written() {
        let mut buffer = PacketBuffer::new(20);
        buffer.begin_data_packet(0);
        assert!(buffer.push_block(1, &[0; 4]).is_ok());
        let err = buffer.push_block(2, &[0; 4]).unwrap_err();
        assert!(matches!(err, ControlinoError::PacketOverflow { capacity: 20, .. }));
        assert_eq!(buffer.block_count(), 1);
        assert!(buffer.write_string_packet(&"x".repeat(14)).is_err());
    }

    #[test]
    fn decoder_rejects_malformed_packets() {
        let mut buffer = PacketBuffer::new(64);
        buffer.begin_data_packet(7);
        buffer.push_block(1, &[9, 9]).unwrap();
        let good = buffer.finish().to_vec();

        let mut bad_sync = good.clone();
        bad_sync[0] = 0x00;
        assert!(decode_packet(&bad_sync).is_err());

        let mut bad_type = good.clone();
        bad_type[4] = 7;
        assert!(decode_packet(&bad_type).is_err());

        assert!(decode_packet(&good[..good.len() - 1]).is_err());

        let mut bad_block_len = good.clone();
        bad_block_len[14] = 40;
        assert!(decode_packet(&bad_block_len).is_err());

        assert!(decode_packet(&good[..3]).is_err());
    }

    #[test]
    fn datapoints_are_big_endian() {
        let block = DataBlock { channel_id: 0, payload: vec![0x01, 0x02, 0x03, 0x04] };
        assert_eq!(block.datapoints(2).unwrap(), vec![0x0102, 0x0304]);
        assert_eq!(block.datapoints(1).unwrap(), vec![1, 2, 3, 4]);
        assert!(block.datapoints(3).is_err());
        assert!(block.datapoints(0).is_err());
    }

    proptest! {
        #[test]
        fn prop_decoded_blocks_match_written_blocks(
            timestamp in any::<u32>(),
            blocks in prop::collection::vec(
                (any::<u8>(), prop::collection::vec(any::<u8>(), 1..24)),
                0..12
            )
        ) {
            let mut buffer = PacketBuffer::new(500);
            buffer.begin_data_packet(timestamp);
            for (id, payload) in &blocks {
                buffer.push_block(*id, payload).unwrap();
            }
            let bytes = buffer.finish().to_vec();

            let payload_total: usize = blocks.iter().map(|(_, p)| p.len()).sum();
            prop_assert_eq!(bytes.len(), 7 + 6 + 3 * blocks.len() + payload_total);

            match decode_packet(&bytes).unwrap() {
                DecodedPacket::Data(packet) => {
                    prop_assert_eq!(packet.timestamp_ms, timestamp);
                    prop_assert_eq!(packet.blocks.len(), blocks.len());
                    for (decoded, (id, payload)) in packet.blocks.iter().zip(&blocks) {
                        prop_assert_eq!(decoded.channel_id, *id);
                        prop_assert_eq!(&decoded.payload, payload);
                    }
                }
                other => prop_assert!(false, "Expected data packet, got {:?}", other),
            }
        }
    }
}
