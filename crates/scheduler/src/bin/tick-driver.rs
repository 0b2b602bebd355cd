//! tick-driver: fixed-rate host loop around the tick scheduler.
//!
//! Stands in for a game server's main loop: advances a [`Scheduler`] at a
//! fixed tick rate, with a handful of demonstration plugins registering
//! synchronous, asynchronous, periodic and failing work. Prints the driver
//! settings and final scheduler metrics as JSON on exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use tickwork_core::config::load_dotenv;
use tickwork_core::{DriverConfig, OwnerId, TaskError, Tick};
use tickwork_scheduler::{Scheduler, SchedulerConfig};

// ── CLI ─────────────────────────────────────────────────────────────

/// Drive a tick scheduler at a fixed rate with demonstration plugins.
#[derive(Parser, Debug)]
#[command(name = "tick-driver", version, about)]
struct Cli {
    /// Path to tickwork.toml config file.
    #[arg(long, env = "TICKWORK_CONFIG", default_value = "config/tickwork.toml")]
    config: String,

    /// Ticks per second (overrides TICKWORK_TPS).
    #[arg(long)]
    tps: Option<u32>,

    /// Number of ticks to run, 0 = forever (overrides TICKWORK_MAX_TICKS).
    #[arg(long)]
    ticks: Option<u64>,

    /// Seconds to wait for asynchronous tasks at shutdown.
    #[arg(long, env = "TICKWORK_SHUTDOWN_TIMEOUT", default_value_t = 5)]
    shutdown_timeout: u64,
}

// ── Demo plugins ────────────────────────────────────────────────────

/// Players the demo "server" has online.
const ONLINE_PLAYERS: &[&str] = &["Alex", "Steve", "Noor", "Kai"];

fn register_demo_plugins(scheduler: &Arc<Scheduler>) -> anyhow::Result<()> {
    // One-shot greeting shortly after startup.
    scheduler.run_task_later(
        "welcome",
        || {
            info!("welcome plugin ready, {} players online", ONLINE_PLAYERS.len());
            Ok(())
        },
        5,
    )?;

    // Every second (at 20 TPS): run a callback for every online player.
    scheduler.run_task_timer(
        "broadcaster",
        || {
            for player in ONLINE_PLAYERS {
                debug!(player, "sending tip of the day");
            }
            Ok(())
        },
        0,
        20,
    )?;

    // Autosave off the tick thread.
    let saves = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&saves);
    scheduler.run_task_async(
        "economy",
        move || {
            std::thread::sleep(Duration::from_millis(30));
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            info!(save = n, "economy balances flushed");
            Ok(())
        },
        10,
        Some(100),
    )?;

    // Fails every other run; failures are reported, the schedule continues.
    let attempts = Arc::new(AtomicU64::new(0));
    scheduler.run_task_timer(
        "flaky-stats",
        move || {
            if attempts.fetch_add(1, Ordering::Relaxed) % 2 == 1 {
                return Err(TaskError::failed("stats endpoint unreachable"));
            }
            Ok(())
        },
        0,
        50,
    )?;

    Ok(())
}

// ── Main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let mut driver = DriverConfig::from_env();
    if let Some(tps) = cli.tps {
        driver.ticks_per_second = tps.max(1);
    }
    if let Some(ticks) = cli.ticks {
        driver.max_ticks = ticks;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&driver.log_filter)),
        )
        .init();
    driver.log_summary();

    // Load scheduler config (fall back to defaults if file not found)
    let config = match SchedulerConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded scheduler config");
            cfg
        }
        Err(e) => {
            warn!(error = %e, path = %cli.config, "failed to load config, using defaults");
            SchedulerConfig::default()
        }
    };

    let scheduler = Arc::new(Scheduler::new(config).context("building scheduler")?);
    register_demo_plugins(&scheduler)?;

    let interval = driver.tick_interval();
    let unload_at = driver.max_ticks / 2;
    let mut deadline = Instant::now();
    let mut tick = Tick::ZERO;

    info!("tick-driver starting");
    loop {
        if driver.max_ticks > 0 && tick.0 >= driver.max_ticks {
            break;
        }

        scheduler.advance(tick);

        // Plugin unload halfway through the run.
        if unload_at > 0 && tick.0 == unload_at {
            let n = scheduler.cancel_all(&OwnerId::new("flaky-stats"));
            info!(tick = tick.0, cancelled = n, "flaky-stats plugin unloaded");
        }

        deadline += interval;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else if now - deadline > interval {
            warn!(
                tick = tick.0,
                behind = ?(now - deadline),
                "can't keep up, tick loop running behind"
            );
            deadline = now;
        }
        tick = tick.next();
    }

    if !scheduler.shutdown(Duration::from_secs(cli.shutdown_timeout)) {
        warn!("shutdown timed out with asynchronous tasks in flight");
    }

    let metrics = serde_json::to_value(scheduler.metrics())?;
    let report = serde_json::json!({
        "driver": driver.summary(),
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("tick-driver exited cleanly");
    Ok(())
}
