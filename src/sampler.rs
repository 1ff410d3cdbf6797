//! Per-channel sampling and schedule slip recovery
//!
//! One sampler pass walks the registry in registration order. A channel is due when
//! the relative clock has reached its `next_sample_time`; its schedule then moves
//! forward by one period. If the advanced time is still behind the clock the device
//! has fallen behind, and the whole pass is abandoned so the caller can
//! resynchronise every channel to a fresh packet boundary.

use tracing::{trace, warn};

use crate::board::Board;
use crate::registry::{ChannelId, ChannelRegistry};
use crate::types::{Millis, is_behind, time_reached};

/// Result of one sampler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePass {
    /// Every due channel was read.
    Completed {
        /// Datapoints stored in data blocks
        sampled: usize,
        /// Datapoints read while their block was already full
        dropped: usize,
    },
    /// A channel could not keep up; the pass stopped at it.
    Slipped { channel: ChannelId },
}

/// Sample every due channel at relative time `now`.
pub fn sample_due_channels<B: Board + ?Sized>(
    registry: &mut ChannelRegistry,
    board: &mut B,
    now: Millis,
) -> SamplePass {
    let mut sampled = 0;
    let mut dropped = 0;

    for (position, channel) in registry.iter_mut().enumerate() {
        if !time_reached(now, channel.next_sample_time()) {
            continue;
        }

        let next = channel.advance_schedule();
        if is_behind(next, now) {
            warn!(
                "Channel {}{} slipped: next sample at {} ms but clock is at {} ms",
                channel.kind().tag(),
                channel.index(),
                next,
                now
            );
            return SamplePass::Slipped { channel: ChannelId(position) };
        }

        let value = channel.kind().read(board, channel.index()).unwrap_or(0);
        if channel.push_datapoint(value) {
            sampled += 1;
            trace!("Sampled {}{} = {} at {} ms", channel.kind().tag(), channel.index(), value, now);
        } else {
            dropped += 1;
            trace!("Block full for {}{}, dropped {}", channel.kind().tag(), channel.index(), value);
        }
    }

    SamplePass::Completed { sampled, dropped }
}

/// Move the packet boundary forward until it is at least one period past `now`,
/// then realign every channel to it.
///
/// Returns the number of packet boundaries skipped.
pub fn resynchronize(
    registry: &mut ChannelRegistry,
    next_packet_time: &mut Millis,
    packet_period: Millis,
    now: Millis,
) -> u32 {
    let horizon = now.wrapping_add(packet_period);
    let mut skipped = 0;
    while is_behind(*next_packet_time, horizon) {
        *next_packet_time = next_packet_time.wrapping_add(packet_period);
        skipped += 1;
    }

    registry.reset_all(*next_packet_time);
    skipped
}
