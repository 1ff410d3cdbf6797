//! Driver runs the cooperative poll loop on a tokio task

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::board::Board;
use crate::clock::Clock;
use crate::command::{CommandReader, dispatch_line};
use crate::scheduler::Scheduler;
use crate::transmit::Transmitter;

/// Interval between poll iterations.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Consecutive transmit failures after which the session is stopped.
const MAX_TRANSMIT_ERRORS: u32 = 10;

/// Handle to a running poll loop
pub struct DriverHandle<B, C, T> {
    /// Raw bytes received from the host, as read from the serial link
    pub input: mpsc::Sender<Vec<u8>>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    join: JoinHandle<Scheduler<B, C, T>>,
}

impl<B, C, T> DriverHandle<B, C, T> {
    /// Cancel the loop and get the scheduler back.
    pub async fn shutdown(self) -> Result<Scheduler<B, C, T>, JoinError> {
        self.cancel.cancel();
        self.join.await
    }
}

/// Driver spawns the poll loop
///
/// The loop owns the scheduler. Each iteration either dispatches the command lines
/// completed by newly received bytes or, once per [`POLL_INTERVAL`], polls the
/// scheduler. Nothing runs in parallel with a poll.
pub struct Driver;

impl Driver {
    pub fn spawn<B, C, T>(scheduler: Scheduler<B, C, T>) -> DriverHandle<B, C, T>
    where
        B: Board + Send + 'static,
        C: Clock + Send + 'static,
        T: Transmitter + Send + 'static,
    {
        let (input_tx, input_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let cancel_loop = cancel.clone();
        let join = tokio::spawn(async move { Self::poll_task(scheduler, input_rx, cancel_loop).await });

        DriverHandle { input: input_tx, cancel, join }
    }

    async fn poll_task<B, C, T>(
        mut scheduler: Scheduler<B, C, T>,
        mut input: mpsc::Receiver<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Scheduler<B, C, T>
    where
        B: Board,
        C: Clock,
        T: Transmitter,
    {
        info!("Poll loop started");
        let mut reader = CommandReader::new();
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut input_open = true;
        let mut packets_sent = 0u64;
        let mut error_count = 0u32;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Poll loop cancelled");
                    break;
                }
                bytes = input.recv(), if input_open => match bytes {
                    Some(bytes) => {
                        trace!("Received {} byte(s) from host", bytes.len());
                        for line in reader.process_bytes(&bytes) {
                            // failures are logged by dispatch_line
                            let _ = dispatch_line(&line, &mut scheduler);
                        }
                    }
                    None => {
                        debug!("Host input closed");
                        input_open = false;
                    }
                },
                _ = interval.tick() => match scheduler.poll() {
                    Ok(report) => {
                        error_count = 0;
                        if report.packet_len.is_some() {
                            packets_sent += 1;
                        }
                    }
                    Err(e) => {
                        error_count += 1;
                        warn!("Transmit failed ({}/{}): {}", error_count, MAX_TRANSMIT_ERRORS, e);
                        if error_count >= MAX_TRANSMIT_ERRORS {
                            error!("Too many transmit failures, stopping session");
                            scheduler.stop_session();
                            error_count = 0;
                        }
                    }
                },
            }
        }

        let counters = scheduler.counters();
        info!(
            "Poll loop ended: {} packet(s) sent, {} missed sample event(s), {} missed packet(s)",
            packets_sent, counters.missed_samples, counters.missed_packets
        );
        scheduler
    }
}
