//! Telemetry packet wire format
//!
//! Every packet starts with a common header; data packets add a timestamp and a
//! block count followed by the data blocks:
//!
//! ```text
//! [sync A5 A5 A5 A5, 4][type, 1][packet length, 2]     common header
//! [relative timestamp ms, 4][block count, 2]           data packet header
//! [channel id, 1][block length, 2][block bytes, n]     repeated per block
//! ```
//!
//! Header fields are little-endian. Datapoints inside a block are big-endian.
//! String packets (type 1) carry plain text right after the common header.
//!
//! ## Submodules
//!
//! - [`format`]: writing packets into the reusable [`PacketBuffer`] and decoding them
//! - [`assembler`]: collecting full channel blocks into a data packet
//! - [`reader`]: host-side framing of a raw byte stream into packets

pub mod assembler;
pub mod format;
pub mod reader;

pub use assembler::assemble_data_packet;
pub use format::{DataBlock, DataPacket, DecodedPacket, PacketBuffer, decode_packet};
pub use reader::{PacketCodec, PacketReader};

/// Sync constant that opens every packet.
pub const SYNC: [u8; 4] = [0xA5; 4];

/// Size of the header shared by all packet types.
pub const COMMON_HEADER_SIZE: usize = 7;

/// Common header plus timestamp and block count.
pub const DATA_PACKET_HEADER_SIZE: usize = COMMON_HEADER_SIZE + 4 + 2;

/// Channel id plus block length.
pub const DATA_BLOCK_HEADER_SIZE: usize = 3;

/// Default upper bound on the size of one packet.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 500;

/// Packet type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    String = 1,
}

impl TryFrom<u8> for PacketType {
    type Error = crate::ControlinoError;

    fn try_from(value: u8) -> crate::Result<Self> {
        match value {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::String),
            other => Err(crate::ControlinoError::parse_error(
                "packet header",
                format!("unknown packet type {}", other),
            )),
        }
    }
}
