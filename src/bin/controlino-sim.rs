//! Run the controller against a simulated board over stdio.
//!
//! Host commands are read from stdin and telemetry packets are written to stdout,
//! so the binary can sit behind a pseudo-terminal or a pipe in place of a real
//! serial port. Logs go to stderr and follow `RUST_LOG`.
//!
//! ```text
//! controlino-sim [config.yaml]
//! ```

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use controlino::board::SimulatedBoard;
use controlino::clock::TokioClock;
use controlino::transmit::SerialTransmitter;
use controlino::{ControllerConfig, Driver, Scheduler};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ControllerConfig::from_path(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => ControllerConfig::default(),
    };
    info!(
        "Simulating {:?} ({} channels) at {} baud, {} Hz packets",
        config.board,
        config.max_channels(),
        config.baud_rate,
        config.packet_rate_hz
    );

    let board = SimulatedBoard::new(config.board.digital_pins(), config.board.analog_inputs());
    let transmitter = SerialTransmitter::new(std::io::stdout());
    let scheduler = Scheduler::new(config, board, TokioClock::new(), transmitter)
        .context("creating scheduler")?;

    let handle = Driver::spawn(scheduler);
    let input = handle.input.clone();
    let cancel = handle.cancel.clone();

    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = cancel.cancelled() => break,
            read = stdin.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Host input closed");
                    break;
                }
                Ok(n) => {
                    if input.send(buf[..n].to_vec()).await.is_err() {
                        warn!("Poll loop is gone");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read host input: {}", e);
                    break;
                }
            },
        }
    }

    let scheduler = handle.shutdown().await.context("joining poll loop")?;
    let counters = scheduler.counters();
    info!(
        "Stopped: {} missed sample event(s), {} missed packet(s)",
        counters.missed_samples, counters.missed_packets
    );
    Ok(())
}
