//! Registered channels and their acquisition state
//!
//! A [`RegisteredChannel`] owns a fixed-size data block sized at registration
//! (`width × capacity` bytes) that is never resized. Channels are kept in
//! registration order; the same pin may be registered more than once, giving
//! independent scheduling entries.
//!
//! One-shot channels take a single datapoint at the next packet boundary and
//! leave the registry once that block has been packed. Removing them shifts the
//! [`ChannelId`] of every later channel down by one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MAX_BOARD_PINS;
use crate::packet::{DATA_BLOCK_HEADER_SIZE, DATA_PACKET_HEADER_SIZE};
use crate::types::{ChannelKind, DatapointWidth, Millis, SamplingRate};
use crate::{ControlinoError, Result};

/// Position of a channel in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

/// A channel the host asked to sample.
#[derive(Debug, Clone)]
pub struct RegisteredChannel {
    kind: ChannelKind,
    index: u8,
    rate: SamplingRate,
    period_ms: Millis,
    width: usize,
    capacity: usize,
    data_block: Box<[u8]>,
    ready_count: usize,
    next_sample_time: Millis,
    one_shot: bool,
    finished: bool,
}

impl RegisteredChannel {
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Pin number, also used as the block id on the wire.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn sampling_rate(&self) -> SamplingRate {
        self.rate
    }

    pub fn sampling_period_ms(&self) -> Millis {
        self.period_ms
    }

    /// Bytes per datapoint.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Datapoints held before a packet boundary.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn data_block_len(&self) -> usize {
        self.data_block.len()
    }

    pub fn data_block(&self) -> &[u8] {
        &self.data_block
    }

    pub fn ready_count(&self) -> usize {
        self.ready_count
    }

    pub fn is_full(&self) -> bool {
        self.ready_count == self.capacity
    }

    pub fn next_sample_time(&self) -> Millis {
        self.next_sample_time
    }

    /// Read once, then removed after its block is packed.
    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    /// Move the due time forward by one period and return the new value.
    pub(crate) fn advance_schedule(&mut self) -> Millis {
        self.next_sample_time = self.next_sample_time.wrapping_add(self.period_ms);
        self.next_sample_time
    }

    /// Append a datapoint most-significant byte first.
    ///
    /// Returns `false` and leaves the block untouched if it is already full.
    pub(crate) fn push_datapoint(&mut self, value: u32) -> bool {
        if self.ready_count >= self.capacity {
            return false;
        }

        let start = self.ready_count * self.width;
        let slot = &mut self.data_block[start..start + self.width];
        for (i, byte) in slot.iter_mut().enumerate() {
            let shift = 8 * (self.width - 1 - i);
            *byte = if shift < 32 { (value >> shift) as u8 } else { 0 };
        }

        self.ready_count += 1;
        true
    }

    /// Mark the block as sent. A one-shot channel is then due for removal.
    pub(crate) fn clear_ready(&mut self) {
        self.ready_count = 0;
        self.finished = self.one_shot;
    }

    /// Drop buffered data and realign the schedule to `next_sample_time`.
    pub(crate) fn reset(&mut self, next_sample_time: Millis) {
        self.ready_count = 0;
        self.next_sample_time = next_sample_time;
    }
}

/// Parameters of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRequest {
    pub tag: char,
    pub index: u8,
    pub rate_hz: u32,
    /// Datapoint width for bus channels; ignored for pin channels
    pub byte_width: Option<usize>,
}

/// Ordered set of registered channels with a fixed upper bound.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<RegisteredChannel>,
    max_channels: usize,
}

impl ChannelRegistry {
    pub fn new(max_channels: usize) -> Self {
        let preallocate = max_channels.min(2 * MAX_BOARD_PINS);
        Self { channels: Vec::with_capacity(preallocate), max_channels }
    }

    /// Validate a request, allocate its data block and append it.
    ///
    /// `packet_rate` fixes the block capacity, `max_packet_size` rejects blocks that
    /// could never be sent, and `next_sample_time` is the current packet boundary the
    /// first sample is aligned to. On error the registry is unchanged.
    pub fn register(
        &mut self,
        request: ChannelRequest,
        packet_rate: SamplingRate,
        max_packet_size: usize,
        next_sample_time: Millis,
    ) -> Result<ChannelId> {
        self.insert(request, false, packet_rate, max_packet_size, next_sample_time)
    }

    /// Register a channel read a single time at `next_sample_time`.
    ///
    /// The request's rate is replaced by the packet rate, so the block holds one
    /// datapoint and is sent in the first packet after it is taken.
    pub fn register_once(
        &mut self,
        request: ChannelRequest,
        packet_rate: SamplingRate,
        max_packet_size: usize,
        next_sample_time: Millis,
    ) -> Result<ChannelId> {
        let request = ChannelRequest { rate_hz: packet_rate.hz(), ..request };
        self.insert(request, true, packet_rate, max_packet_size, next_sample_time)
    }

    fn insert(
        &mut self,
        request: ChannelRequest,
        one_shot: bool,
        packet_rate: SamplingRate,
        max_packet_size: usize,
        next_sample_time: Millis,
    ) -> Result<ChannelId> {
        let kind = ChannelKind::from_tag(request.tag)
            .ok_or(ControlinoError::UnknownChannelType { tag: request.tag })?;

        let width = match kind.datapoint_width() {
            DatapointWidth::Fixed(width) => width,
            DatapointWidth::AtRegistration => match request.byte_width {
                Some(width) if width > 0 => width,
                other => {
                    return Err(ControlinoError::InvalidByteWidth { tag: kind.tag(), width: other });
                }
            },
        };

        let rate = SamplingRate::new(request.rate_hz)?;

        if self.channels.len() >= self.max_channels {
            return Err(ControlinoError::RegistryFull { capacity: self.max_channels });
        }

        let capacity = rate.capacity_per_packet(packet_rate);
        let block_len = width
            .checked_mul(capacity)
            .ok_or(ControlinoError::OutOfMemory { bytes: usize::MAX })?;

        let required = DATA_PACKET_HEADER_SIZE + DATA_BLOCK_HEADER_SIZE + block_len;
        if required > max_packet_size || block_len > u16::MAX as usize {
            return Err(ControlinoError::PacketOverflow { required, capacity: max_packet_size });
        }

        let mut block = Vec::new();
        block
            .try_reserve_exact(block_len)
            .map_err(|_| ControlinoError::OutOfMemory { bytes: block_len })?;
        block.resize(block_len, 0);

        let id = ChannelId(self.channels.len());
        self.channels.push(RegisteredChannel {
            kind,
            index: request.index,
            rate,
            period_ms: rate.period_ms(),
            width,
            capacity,
            data_block: block.into_boxed_slice(),
            ready_count: 0,
            next_sample_time,
            one_shot,
            finished: false,
        });

        debug!(
            "Registered {}{} as {:?}: {} Hz, {} byte(s) x {} datapoints{}",
            kind.tag(),
            request.index,
            id,
            rate.hz(),
            width,
            capacity,
            if one_shot { ", once" } else { "" }
        );

        Ok(id)
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    pub fn get(&self, id: ChannelId) -> Option<&RegisteredChannel> {
        self.channels.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredChannel> {
        self.channels.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegisteredChannel> {
        self.channels.iter_mut()
    }

    /// Drop one-shot channels whose block has been packed. Returns how many left.
    pub(crate) fn remove_finished(&mut self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|channel| !channel.finished);
        let removed = before - self.channels.len();
        if removed > 0 {
            debug!("Removed {} completed one-shot channel(s)", removed);
        }
        removed
    }

    /// Reset every channel's acquisition state to a common boundary.
    pub(crate) fn reset_all(&mut self, next_sample_time: Millis) {
        for channel in &mut self.channels {
            channel.reset(next_sample_time);
        }
    }
}
