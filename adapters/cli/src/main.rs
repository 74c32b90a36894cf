#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless runner for a Citadel Defence session.
//!
//! Wires the event log, the world actor, the spawner and the wall builder
//! together, issues automated build requests at a fixed rate, and polls the
//! scalar getters for a periodic status line. The session ends when the
//! configured duration elapses or a raider breaches the citadel; components
//! shut down producers-first and a JSON run summary lands on stdout. Domain
//! events stream to stdout as they happen; diagnostics go to stderr via
//! `RUST_LOG`-filtered tracing.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use citadel_defence_core::{CellCoord, GridBounds};
use citadel_defence_event_log::EventLog;
use citadel_defence_system_builder::{Builder, BuilderConfig};
use citadel_defence_system_spawning::{SpawnConfig, Spawner};
use citadel_defence_world::{WorldConfig, WorldState};
use clap::Parser;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

const COMMAND_QUEUE_CAPACITY: usize = 30;
const SCORE_TICK: Duration = Duration::from_secs(1);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Citadel Defence session runner", long_about = None)]
struct Cli {
    /// Maximum session length in seconds; a breach ends the session earlier.
    #[arg(long, default_value_t = 30)]
    duration: u64,
    /// Number of grid columns.
    #[arg(long, default_value_t = 9)]
    columns: u32,
    /// Number of grid rows.
    #[arg(long, default_value_t = 9)]
    rows: u32,
    /// Milliseconds between automated wall build requests.
    #[arg(long, default_value_t = 1000)]
    build_interval_ms: u64,
    /// Seed for the build request generator.
    #[arg(long, default_value_t = 0xC17A)]
    seed: u64,
}

/// Final state of the session, printed as JSON on stdout.
#[derive(Serialize)]
struct RunSummary {
    score: u64,
    walls_standing: usize,
    raiders_active: usize,
    breached: bool,
    elapsed_ms: u128,
}

/// Entry point for the Citadel Defence command-line runner.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .compact()
        .init();
    let cli = Cli::parse();
    anyhow::ensure!(
        cli.columns > 0 && cli.rows > 0,
        "the grid needs at least one column and one row"
    );

    let bounds = GridBounds::new(cli.columns, cli.rows);
    let mut log = EventLog::start(Box::new(io::stdout())).context("start the event log")?;
    let mut world = WorldState::start(
        WorldConfig::new(bounds, SCORE_TICK, COMMAND_QUEUE_CAPACITY),
        log.publisher(),
    )
    .context("start the world actor")?;
    let handle = world.handle();
    let mut spawner =
        Spawner::start(handle.clone(), SpawnConfig::default()).context("start the spawner")?;
    let mut builder =
        Builder::start(handle.clone(), BuilderConfig::default()).context("start the builder")?;
    let requester = builder.requester();
    info!(
        columns = bounds.columns(),
        rows = bounds.rows(),
        duration = cli.duration,
        "session started"
    );

    let started = Instant::now();
    let deadline = started + Duration::from_secs(cli.duration);
    let build_interval = Duration::from_millis(cli.build_interval_ms.max(1));
    let mut rng = SmallRng::seed_from_u64(cli.seed);
    let mut next_build = started + build_interval;
    let mut next_status = started + STATUS_INTERVAL;

    while Instant::now() < deadline && !handle.is_game_over() {
        let now = Instant::now();
        if now >= next_build {
            let cell = random_cell(&mut rng, bounds);
            match requester.request(cell) {
                Ok(()) => debug!(%cell, "build requested"),
                Err(error) => debug!(%cell, %error, "build request refused"),
            }
            next_build = now + build_interval;
        }
        if now >= next_status {
            info!(
                score = handle.score(),
                walls = handle.wall_count(),
                "status"
            );
            next_status = now + STATUS_INTERVAL;
        }
        thread::sleep(POLL_INTERVAL);
    }

    let breached = handle.is_game_over();
    if breached {
        info!("citadel breached, shutting down");
    } else {
        info!("session time elapsed, shutting down");
    }

    // Producers first, so nothing submits to a world that is draining.
    spawner.stop();
    builder.stop();
    let raiders_active = handle.raider_view().map(|view| view.len()).unwrap_or(0);
    world.stop();
    log.stop();

    let summary = RunSummary {
        score: handle.score(),
        walls_standing: handle.wall_count(),
        raiders_active,
        breached,
        elapsed_ms: started.elapsed().as_millis(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("render the run summary")?
    );
    Ok(())
}

fn random_cell(rng: &mut SmallRng, bounds: GridBounds) -> CellCoord {
    CellCoord::new(
        rng.gen_range(0..bounds.columns()),
        rng.gen_range(0..bounds.rows()),
    )
}
