//! Acquisition context and poll step
//!
//! [`Scheduler`] owns every piece of state the acquisition loop touches: the
//! channel registry, the session clock, the next packet boundary, the slip
//! counters and the reusable packet buffer, plus the board, clock and
//! transmitter it drives. One call to [`Scheduler::poll`] is one loop iteration.

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::board::Board;
use crate::clock::{Clock, SessionClock};
use crate::config::ControllerConfig;
use crate::packet::{PacketBuffer, assemble_data_packet};
use crate::registry::{ChannelId, ChannelRegistry, ChannelRequest};
use crate::sampler::{SamplePass, resynchronize, sample_due_channels};
use crate::transmit::Transmitter;
use crate::types::{ChannelKind, Direction, Millis, SamplingRate, is_behind};
use crate::{ControlinoError, Result};

/// Degradation counters. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionCounters {
    pub missed_samples: u32,
    pub missed_packets: u32,
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Datapoints stored
    pub sampled: usize,
    /// Datapoints discarded because their block was full
    pub dropped: usize,
    /// The pass slipped and every channel was resynchronised
    pub slipped: bool,
    /// Packet boundaries skipped by the resynchronisation
    pub packets_skipped: u32,
    /// Length of the data packet sent this poll, if any
    pub packet_len: Option<usize>,
}

pub struct Scheduler<B, C, T> {
    config: ControllerConfig,
    packet_rate: SamplingRate,
    registry: ChannelRegistry,
    session: SessionClock,
    next_packet_time: Millis,
    counters: AcquisitionCounters,
    buffer: PacketBuffer,
    board: B,
    clock: C,
    transmitter: T,
}

impl<B: Board, C: Clock, T: Transmitter> Scheduler<B, C, T> {
    pub fn new(config: ControllerConfig, board: B, clock: C, transmitter: T) -> Result<Self> {
        config.validate()?;
        let packet_rate = config.packet_rate()?;

        debug!(
            "Scheduler for {:?}: {} channels, {} Hz packets, {} byte buffer",
            config.board,
            config.max_channels(),
            packet_rate.hz(),
            config.max_packet_size
        );

        Ok(Self {
            registry: ChannelRegistry::new(config.max_channels()),
            buffer: PacketBuffer::new(config.max_packet_size),
            packet_rate,
            config,
            session: SessionClock::default(),
            next_packet_time: 0,
            counters: AcquisitionCounters::default(),
            board,
            clock,
            transmitter,
        })
    }

    /// Add a channel. Its first sample lines up with the next packet boundary.
    pub fn register(&mut self, request: ChannelRequest) -> Result<ChannelId> {
        self.registry.register(
            request,
            self.packet_rate,
            self.config.max_packet_size,
            self.next_packet_time,
        )
    }

    /// Register a channel read a single time at the next packet boundary.
    ///
    /// Its one-datapoint block goes out in the following packet and the channel
    /// is then removed. The request's rate is ignored.
    pub fn register_once(&mut self, request: ChannelRequest) -> Result<ChannelId> {
        self.registry.register_once(
            request,
            self.packet_rate,
            self.config.max_packet_size,
            self.next_packet_time,
        )
    }

    /// Start (or restart) a session at the current clock reading.
    ///
    /// The first packet is due one packet period from now and every channel is
    /// emptied and aligned to it.
    pub fn start_session(&mut self) {
        let now = self.clock.now_ms();
        self.session.start(now);
        self.next_packet_time = self.packet_rate.period_ms();
        self.registry.reset_all(self.next_packet_time);
        info!("Session started at clock {} ms with {} channel(s)", now, self.registry.count());
    }

    /// Stop acquiring. Partially filled blocks are discarded by the next start.
    pub fn stop_session(&mut self) {
        if self.session.is_active() {
            info!("Session stopped at {} ms", self.relative_now());
        }
        self.session.stop();
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Milliseconds since the session origin.
    pub fn relative_now(&self) -> Millis {
        self.session.relative(self.clock.now_ms())
    }

    /// Run the sampler, then send a data packet if the packet boundary has passed.
    ///
    /// Does nothing while no session is active. The only error is a transmitter failure.
    pub fn poll(&mut self) -> Result<PollReport> {
        let mut report = PollReport::default();
        if !self.session.is_active() {
            return Ok(report);
        }

        let now = self.relative_now();
        let period = self.packet_rate.period_ms();

        if !self.registry.is_empty() {
            match sample_due_channels(&mut self.registry, &mut self.board, now) {
                SamplePass::Completed { sampled, dropped } => {
                    report.sampled = sampled;
                    report.dropped = dropped;
                }
                SamplePass::Slipped { .. } => {
                    self.counters.missed_samples = self.counters.missed_samples.wrapping_add(1);
                    let skipped =
                        resynchronize(&mut self.registry, &mut self.next_packet_time, period, now);
                    self.counters.missed_packets = self.counters.missed_packets.wrapping_add(skipped);
                    report.slipped = true;
                    report.packets_skipped = skipped;
                    debug!(
                        "Resynchronised at {} ms: skipped {} packet(s), next packet at {} ms",
                        now, skipped, self.next_packet_time
                    );
                }
            }
        }

        if is_behind(self.next_packet_time, now) {
            let packet = assemble_data_packet(&mut self.buffer, &mut self.registry, now);
            let len = packet.len();
            trace!("Data packet at {} ms: {} bytes", now, len);
            self.next_packet_time = self.next_packet_time.wrapping_add(period);
            self.transmitter.send(packet)?;
            report.packet_len = Some(len);
        }

        Ok(report)
    }

    /// Set the direction of a pin through its kind's direction operation.
    pub fn set_direction(&mut self, tag: char, index: u8, direction: Direction) -> Result<()> {
        let kind = ChannelKind::from_tag(tag).ok_or(ControlinoError::UnknownChannelType { tag })?;
        kind.set_direction(&mut self.board, index, direction)
    }

    /// Write values to a pin through its kind's write operation.
    pub fn write_channel(&mut self, tag: char, index: u8, values: &[u32]) -> Result<()> {
        let kind = ChannelKind::from_tag(tag).ok_or(ControlinoError::UnknownChannelType { tag })?;
        kind.write(&mut self.board, index, values)
    }

    /// Send a string packet through the shared buffer.
    pub fn send_string(&mut self, text: &str) -> Result<()> {
        let packet = self.buffer.write_string_packet(text)?;
        self.transmitter.send(packet)
    }

    pub fn counters(&self) -> AcquisitionCounters {
        self.counters
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Relative time the next data packet is due.
    pub fn next_packet_time(&self) -> Millis {
        self.next_packet_time
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.transmitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SimulatedBoard;
    use crate::clock::ManualClock;
    use crate::packet::{DecodedPacket, decode_packet};
    use crate::test_utils::{SimScheduler, sim_scheduler, step_ms, take_decoded};
    use crate::config::BoardProfile;
    use crate::transmit::RecordingTransmitter;

    use proptest::prelude::*;

    fn scheduler(start: Millis) -> (SimScheduler, ManualClock) {
        sim_scheduler(ControllerConfig::default(), start).unwrap()
    }

    fn digital(index: u8, rate_hz: u32) -> ChannelRequest {
        ChannelRequest { tag: 'D', index, rate_hz, byte_width: None }
    }

    #[test]
    fn poll_is_inert_without_a_session() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.register(digital(3, 10)).unwrap();

        for _ in 0..500 {
            clock.advance(1);
            assert_eq!(scheduler.poll().unwrap(), PollReport::default());
        }
        assert!(scheduler.transmitter().packets().is_empty());
        assert_eq!(scheduler.registry().iter().next().unwrap().ready_count(), 0);
        assert_eq!(scheduler.counters(), AcquisitionCounters::default());
    }

    #[test]
    fn start_session_aligns_channels_to_the_first_packet() {
        let (mut scheduler, _clock) = scheduler(5_000);
        scheduler.register(digital(3, 10)).unwrap();
        scheduler.start_session();

        assert!(scheduler.is_active());
        assert_eq!(scheduler.relative_now(), 0);
        assert_eq!(scheduler.next_packet_time(), 100);
        assert_eq!(scheduler.registry().iter().next().unwrap().next_sample_time(), 100);
    }

    #[test]
    fn packet_is_sent_once_the_boundary_has_passed() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.board_mut().set_digital(3, 1);
        scheduler.register(digital(3, 10)).unwrap();
        scheduler.start_session();

        clock.set(100);
        let report = scheduler.poll().unwrap();
        assert_eq!(report.sampled, 1);
        assert_eq!(report.packet_len, None);

        clock.set(101);
        let report = scheduler.poll().unwrap();
        assert_eq!(report.packet_len, Some(17));
        assert_eq!(scheduler.next_packet_time(), 200);

        let sent = scheduler.transmitter().packets();
        let DecodedPacket::Data(packet) = decode_packet(&sent[0]).unwrap() else {
            panic!("Expected data packet");
        };
        assert_eq!(packet.timestamp_ms, 101);
        assert_eq!(packet.blocks[0].channel_id, 3);
        assert_eq!(packet.blocks[0].payload, vec![1]);
    }

    #[test]
    fn slip_counts_once_and_resynchronises() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.register(digital(3, 10)).unwrap();
        scheduler.register(digital(4, 10)).unwrap();
        scheduler.start_session();
        scheduler.poll().unwrap();

        clock.set(350);
        let report = scheduler.poll().unwrap();
        assert!(report.slipped);
        assert_eq!(report.packets_skipped, 4);
        assert_eq!(report.packet_len, None);
        assert_eq!(scheduler.counters(), AcquisitionCounters { missed_samples: 1, missed_packets: 4 });
        assert_eq!(scheduler.next_packet_time(), 500);
        assert!(scheduler.registry().iter().all(|c| c.ready_count() == 0));
    }

    #[test]
    fn fast_channel_ships_full_blocks_every_period() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.board_mut().set_analog(1, 0x0102);
        scheduler.register(ChannelRequest { tag: 'A', index: 1, rate_hz: 40, byte_width: None }).unwrap();
        scheduler.start_session();

        let reports = step_ms(&mut scheduler, &clock, 301).unwrap();
        assert_eq!(reports.iter().map(|r| r.sampled).sum::<usize>(), 8);
        assert_eq!(reports.iter().filter(|r| r.dropped > 0).count(), 1);

        let packets = take_decoded(&mut scheduler).unwrap();
        let blocks: Vec<usize> = packets
            .iter()
            .map(|p| match p {
                DecodedPacket::Data(data) => data.blocks.len(),
                DecodedPacket::String(_) => panic!("Unexpected string packet"),
            })
            .collect();
        // First boundary holds one datapoint, then each period fills all four
        assert_eq!(blocks, vec![0, 1, 1]);
        let DecodedPacket::Data(last) = &packets[2] else { unreachable!() };
        assert_eq!(last.blocks[0].datapoints(2).unwrap(), vec![0x0102; 4]);
    }

    #[test]
    fn registering_mid_session_aligns_to_next_packet() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.start_session();
        clock.set(150);
        scheduler.poll().unwrap();

        let id = scheduler.register(digital(7, 10)).unwrap();
        assert_eq!(scheduler.registry().get(id).unwrap().next_sample_time(), 200);
    }

    #[test]
    fn one_shot_read_ships_in_exactly_one_packet() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.board_mut().set_analog(3, 0x0203);
        scheduler.register(digital(5, 10)).unwrap();
        scheduler
            .register_once(ChannelRequest { tag: 'A', index: 3, rate_hz: 0, byte_width: None })
            .unwrap();
        scheduler.start_session();

        step_ms(&mut scheduler, &clock, 201).unwrap();

        assert_eq!(scheduler.registry().count(), 1);
        assert!(!scheduler.registry().iter().any(|c| c.is_one_shot()));

        let packets: Vec<_> = take_decoded(&mut scheduler)
            .unwrap()
            .into_iter()
            .map(|p| match p {
                DecodedPacket::Data(data) => data,
                DecodedPacket::String(_) => panic!("Unexpected string packet"),
            })
            .collect();
        assert_eq!(packets.len(), 2);
        let analog: Vec<_> = packets
            .iter()
            .map(|p| p.blocks.iter().filter(|b| b.channel_id == 3).count())
            .collect();
        assert_eq!(analog, vec![1, 0]);
        assert_eq!(packets[0].timestamp_ms, 101);
        assert_eq!(packets[0].blocks[1].datapoints(2).unwrap(), vec![0x0203]);
    }

    #[test]
    fn stop_session_halts_sampling() {
        let (mut scheduler, clock) = scheduler(0);
        scheduler.register(digital(3, 10)).unwrap();
        scheduler.start_session();
        scheduler.stop_session();

        clock.set(101);
        assert_eq!(scheduler.poll().unwrap(), PollReport::default());
        assert!(!scheduler.is_active());
    }

    #[test]
    fn writes_and_direction_go_to_the_board() {
        let (mut scheduler, _clock) = scheduler(0);
        scheduler.set_direction('D', 13, Direction::Output).unwrap();
        scheduler.write_channel('P', 9, &[300]).unwrap();

        assert_eq!(scheduler.board().direction(13), Some(Direction::Output));
        assert_eq!(scheduler.board().pwm_duty(9), Some(255));
        assert!(matches!(
            scheduler.set_direction('X', 1, Direction::Input),
            Err(ControlinoError::UnknownChannelType { tag: 'X' })
        ));
        assert!(scheduler.write_channel('A', 0, &[1]).is_err());
    }

    #[test]
    fn string_packets_use_the_shared_transmitter() {
        let (mut scheduler, _clock) = scheduler(0);
        scheduler.send_string("PONG").unwrap();

        let sent = scheduler.transmitter().packets();
        assert_eq!(decode_packet(&sent[0]).unwrap(), DecodedPacket::String("PONG".into()));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ControllerConfig { packet_rate_hz: 0, ..Default::default() };
        let result = Scheduler::new(
            config,
            SimulatedBoard::new(1, 1),
            ManualClock::new(0),
            RecordingTransmitter::new(),
        );
        assert!(matches!(result, Err(ControlinoError::Config { .. })));

        let config = ControllerConfig {
            board: BoardProfile::Custom { digital_pins: usize::MAX / 2, analog_inputs: 1 },
            ..Default::default()
        };
        let result = Scheduler::new(
            config,
            SimulatedBoard::new(1, 1),
            ManualClock::new(0),
            RecordingTransmitter::new(),
        );
        assert!(matches!(result, Err(ControlinoError::Config { .. })));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_blocks_never_overfill_under_uneven_polling(
            channels in prop::collection::vec(
                (prop::sample::select(vec!['A', 'D']), 0u8..6, 1u32..=1000),
                0..8,
            ),
            steps in prop::collection::vec(1u32..=150, 1..80),
        ) {
            let (mut scheduler, clock) = scheduler(0);
            for (tag, index, rate_hz) in channels {
                // Rates whose block cannot fit a packet are rejected; skip them
                let _ = scheduler.register(ChannelRequest { tag, index, rate_hz, byte_width: None });
            }
            scheduler.start_session();

            for step in steps {
                clock.advance(step);
                scheduler.poll().unwrap();
                for channel in scheduler.registry().iter() {
                    prop_assert!(channel.ready_count() <= channel.capacity());
                }
            }
        }
    }
}
