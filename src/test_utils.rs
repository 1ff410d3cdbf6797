//! Helpers for driving a scheduler deterministically in tests and benchmarks

#![cfg(any(test, feature = "benchmark"))]

use crate::board::SimulatedBoard;
use crate::clock::ManualClock;
use crate::config::ControllerConfig;
use crate::packet::{DecodedPacket, decode_packet};
use crate::scheduler::{PollReport, Scheduler};
use crate::transmit::RecordingTransmitter;
use crate::types::Millis;
use crate::Result;

/// Scheduler wired to in-memory hardware.
pub type SimScheduler = Scheduler<SimulatedBoard, ManualClock, RecordingTransmitter>;

/// Build a scheduler for `config` whose clock starts at `start` and is advanced
/// through the returned handle.
pub fn sim_scheduler(config: ControllerConfig, start: Millis) -> Result<(SimScheduler, ManualClock)> {
    let clock = ManualClock::new(start);
    let board = SimulatedBoard::new(config.board.digital_pins(), config.board.analog_inputs());
    let scheduler = Scheduler::new(config, board, clock.clone(), RecordingTransmitter::new())?;
    Ok((scheduler, clock))
}

/// Advance the clock one millisecond at a time for `ms` milliseconds, polling
/// after each step.
pub fn step_ms(scheduler: &mut SimScheduler, clock: &ManualClock, ms: Millis) -> Result<Vec<PollReport>> {
    let mut reports = Vec::with_capacity(ms as usize);
    for _ in 0..ms {
        clock.advance(1);
        reports.push(scheduler.poll()?);
    }
    Ok(reports)
}

/// Drain and decode everything the scheduler has sent.
pub fn take_decoded(scheduler: &mut SimScheduler) -> Result<Vec<DecodedPacket>> {
    scheduler
        .transmitter_mut()
        .take()
        .iter()
        .map(|bytes| decode_packet(bytes))
        .collect()
}
