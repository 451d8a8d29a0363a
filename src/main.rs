//! # DShot Bench
//!
//! Runs a DShot600 link against the in-process simulated ESC.
//!
//! The bench ramps throttle up and down, drives the link at the configured
//! loop rate and prints decoded BDShot telemetry as JSON Lines.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dshot_link::channel::ChannelPool;
use dshot_link::config::Config;
use dshot_link::esc::{EscDriver, EscLinkConfig, EscLinkScheduler};
use dshot_link::hal::{MonotonicClock, SimulatedEsc};
use dshot_link::telemetry::TelemetryRecord;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Length of one throttle ramp (up then down)
const RAMP_PERIOD_S: f32 = 8.0;

/// Highest throttle commanded by the ramp
const RAMP_PEAK: f32 = 0.6;

/// Triangle wave between 0 and `RAMP_PEAK`
fn ramp_throttle(elapsed_s: f32) -> f32 {
    let phase = (elapsed_s % RAMP_PERIOD_S) / RAMP_PERIOD_S;
    let triangle = 1.0 - (2.0 * phase - 1.0).abs();
    triangle * RAMP_PEAK
}

fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH))
        }
        None => {
            warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Ok(Config::default())
        }
    }
}

/// Main entry point for the DShot bench
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with a non-blocking tracing subscriber
///    - Load configuration (first argument, else `config/default.toml`)
///    - Build the channel pool and a link on the simulated ESC
///
/// 2. **Main Loop**
///    - Write the ramp throttle at `bench.loop_hz`
///    - Print fresh telemetry every `bench.telemetry_log_interval_ms`
///    - Stop on Ctrl+C or after `bench.duration_s`
///
/// 3. **Shutdown**
///    - Disarm and release the link
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the JSONL records only
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(writer)
        .init();

    info!("DShot bench v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(std::env::args().nth(1))?;
    let pool = Arc::new(ChannelPool::new(config.channels.pool_size));
    let mut esc = EscLinkScheduler::new(
        SimulatedEsc::new(),
        MonotonicClock::new(),
        &pool,
        EscLinkConfig::from(&config),
    );

    esc.begin().context("starting DShot link")?;
    esc.arm(true);
    info!(
        "Link armed ({} Hz updates, bench loop {} Hz), {} of {} channels free",
        config.esc.update_rate_hz,
        config.bench.loop_hz,
        pool.count_free(),
        pool.size()
    );
    info!("Press Ctrl+C to exit");

    let mut tick = interval(Duration::from_micros(1_000_000 / u64::from(config.bench.loop_hz)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut log_tick = interval(Duration::from_millis(config.bench.telemetry_log_interval_ms));

    let deadline = sleep(match config.bench.duration_s {
        0 => Duration::MAX,
        s => Duration::from_secs(s),
    });
    tokio::pin!(deadline);

    let started = Instant::now();
    let mut frames_sent: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let throttle = ramp_throttle(started.elapsed().as_secs_f32());
                if esc.write_normalized(throttle) {
                    frames_sent += 1;
                }
            }

            _ = log_tick.tick() => {
                if let Some(telemetry) = esc.read_telemetry() {
                    let record = TelemetryRecord::new("esc0", &telemetry);
                    print!("{}", record.to_jsonl()?);
                }
            }

            _ = &mut deadline => {
                info!("Bench duration elapsed, shutting down...");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    esc.arm(false);
    info!(
        "Frames sent: {} ({} us each), received by ESC: {}, CRC errors: {}",
        frames_sent,
        esc.frame_duration_us(),
        esc.engine().frames_received(),
        esc.engine().crc_errors()
    );
    esc.end();

    Ok(())
}
