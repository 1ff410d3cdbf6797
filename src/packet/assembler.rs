//! Data packet assembly from the channel registry

use tracing::{trace, warn};

use super::PacketBuffer;
use crate::registry::ChannelRegistry;
use crate::types::Millis;

/// Build a data packet from every channel whose block is exactly full.
///
/// Full blocks are copied in registration order and their channels emptied.
/// Partially filled channels are carried over to a later packet. A packet with no
/// blocks is still produced. If the combined blocks overrun the buffer, the
/// blocks that no longer fit are dropped with a warning. One-shot channels leave
/// the registry once their block has been packed or dropped.
pub fn assemble_data_packet<'a>(
    buffer: &'a mut PacketBuffer,
    registry: &mut ChannelRegistry,
    timestamp: Millis,
) -> &'a [u8] {
    buffer.begin_data_packet(timestamp);

    for channel in registry.iter_mut() {
        if !channel.is_full() {
            continue;
        }

        match buffer.push_block(channel.index(), channel.data_block()) {
            Ok(()) => trace!(
                "Packed {}{}: {} bytes",
                channel.kind().tag(),
                channel.index(),
                channel.data_block_len()
            ),
            Err(e) => warn!(
                "Dropping block for {}{}: {}",
                channel.kind().tag(),
                channel.index(),
                e
            ),
        }
        channel.clear_ready();
    }
    registry.remove_finished();

    buffer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{DecodedPacket, decode_packet};
    use crate::registry::ChannelRequest;
    use crate::types::SamplingRate;

    fn registry_with(rates: &[(char, u8, u32)]) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new(16);
        let packet_rate = SamplingRate::new(10).unwrap();
        for &(tag, index, rate_hz) in rates {
            let request = ChannelRequest { tag, index, rate_hz, byte_width: None };
            registry.register(request, packet_rate, 500, 0).unwrap();
        }
        registry
    }

    #[test]
    fn only_full_channels_are_packed() {
        let mut registry = registry_with(&[('D', 2, 10), ('A', 0, 20), ('A', 1, 10)]);
        for (n, channel) in registry.iter_mut().enumerate() {
            channel.push_datapoint(0x0100 + n as u32);
        }

        let mut buffer = PacketBuffer::new(500);
        let bytes = assemble_data_packet(&mut buffer, &mut registry, 100).to_vec();

        let DecodedPacket::Data(packet) = decode_packet(&bytes).unwrap() else {
            panic!("Expected data packet");
        };
        assert_eq!(packet.timestamp_ms, 100);
        assert_eq!(packet.blocks.len(), 2);
        assert_eq!(packet.blocks[0].channel_id, 2);
        assert_eq!(packet.blocks[0].payload, vec![0x00]);
        assert_eq!(packet.blocks[1].channel_id, 1);
        assert_eq!(packet.blocks[1].payload, vec![0x01, 0x02]);

        let ready: Vec<usize> = registry.iter().map(|c| c.ready_count()).collect();
        assert_eq!(ready, vec![0, 1, 0]);
    }

    #[test]
    fn one_shot_channel_is_removed_after_packing() {
        let mut registry = registry_with(&[('D', 2, 20)]);
        let packet_rate = SamplingRate::new(10).unwrap();
        let once = ChannelRequest { tag: 'A', index: 5, rate_hz: 0, byte_width: None };
        registry.register_once(once, packet_rate, 500, 0).unwrap();
        for channel in registry.iter_mut() {
            channel.push_datapoint(7);
        }

        let mut buffer = PacketBuffer::new(500);
        let bytes = assemble_data_packet(&mut buffer, &mut registry, 100).to_vec();

        let DecodedPacket::Data(packet) = decode_packet(&bytes).unwrap() else {
            panic!("Expected data packet");
        };
        assert_eq!(packet.blocks.len(), 1);
        assert_eq!(packet.blocks[0].channel_id, 5);
        assert_eq!(packet.blocks[0].datapoints(2).unwrap(), vec![7]);
        assert_eq!(registry.count(), 1);
        assert!(!registry.iter().any(|c| c.is_one_shot()));
    }

    #[test]
    fn empty_registry_still_yields_a_packet() {
        let mut registry = ChannelRegistry::new(4);
        let mut buffer = PacketBuffer::new(500);
        let bytes = assemble_data_packet(&mut buffer, &mut registry, 42);

        assert_eq!(bytes.len(), 13);
        assert_eq!(buffer.block_count(), 0);
    }

    #[test]
    fn blocks_past_the_buffer_are_dropped() {
        let mut registry = registry_with(&[('A', 0, 10), ('A', 1, 10)]);
        for channel in registry.iter_mut() {
            channel.push_datapoint(7);
        }

        // Room for the headers and exactly one 5-byte block
        let mut buffer = PacketBuffer::new(18);
        let bytes = assemble_data_packet(&mut buffer, &mut registry, 0).to_vec();

        let DecodedPacket::Data(packet) = decode_packet(&bytes).unwrap() else {
            panic!("Expected data packet");
        };
        assert_eq!(packet.blocks.len(), 1);
        assert!(registry.iter().all(|c| c.ready_count() == 0));
    }
}
