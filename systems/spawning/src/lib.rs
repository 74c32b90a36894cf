#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Raider production.
//!
//! The [`Spawner`] drives a dedicated thread that wakes on a fixed interval,
//! picks a random corner of the grid, and admits a fresh raider there when
//! the corner is free. Each admitted raider gets a movement task scheduled on
//! the spawner's bounded [`WorkerPool`]; the task then reschedules itself at
//! the raider's own cadence until the raider retires.

mod pool;

pub use pool::{Scheduler, Task, WorkerPool};

use std::thread::{self, JoinHandle};
use std::time::Duration;

use citadel_defence_core::{QueryError, RaiderCommand, RaiderId, StartError, SubmitError};
use citadel_defence_system_movement::{Movement, MovementConfig, StepOutcome};
use citadel_defence_world::WorldHandle;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);
const DEFAULT_CADENCE_MIN: Duration = Duration::from_millis(500);
const DEFAULT_CADENCE_MAX: Duration = Duration::from_millis(2000);
const DEFAULT_INITIAL_JITTER: Duration = Duration::from_millis(1500);

/// Timing and sizing parameters for the spawner.
#[derive(Clone, Copy, Debug)]
pub struct SpawnConfig {
    interval: Duration,
    cadence_min: Duration,
    cadence_max: Duration,
    initial_jitter: Duration,
    workers: usize,
    movement: MovementConfig,
}

impl SpawnConfig {
    /// Creates a configuration with explicit values.
    #[must_use]
    pub const fn new(
        interval: Duration,
        cadence_min: Duration,
        cadence_max: Duration,
        initial_jitter: Duration,
        workers: usize,
        movement: MovementConfig,
    ) -> Self {
        Self {
            interval,
            cadence_min,
            cadence_max,
            initial_jitter,
            workers,
            movement,
        }
    }
}

impl Default for SpawnConfig {
    /// Spawns every 1.5 seconds with one worker per available core.
    fn default() -> Self {
        let workers = thread::available_parallelism().map_or(4, usize::from);
        Self::new(
            DEFAULT_INTERVAL,
            DEFAULT_CADENCE_MIN,
            DEFAULT_CADENCE_MAX,
            DEFAULT_INITIAL_JITTER,
            workers,
            MovementConfig::default(),
        )
    }
}

#[derive(Debug, Error)]
enum SpawnError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Owner of the spawner thread and its movement worker pool.
pub struct Spawner {
    driver: Option<JoinHandle<()>>,
    shutdown_tx: Sender<()>,
    pool: WorkerPool,
}

impl Spawner {
    /// Starts the `spawner` thread and its worker pool.
    pub fn start(world: WorldHandle, config: SpawnConfig) -> Result<Self, StartError> {
        let mut pool = WorkerPool::start(config.workers)?;
        let scheduler = pool.scheduler();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let driver = match thread::Builder::new()
            .name("spawner".into())
            .spawn(move || run_driver(world, scheduler, config, shutdown_rx))
        {
            Ok(handle) => handle,
            Err(source) => {
                pool.stop();
                return Err(StartError::Thread {
                    name: "spawner",
                    source,
                });
            }
        };
        Ok(Self {
            driver: Some(driver),
            shutdown_tx,
            pool,
        })
    }

    /// Stops producing raiders, then shuts the worker pool down.
    ///
    /// The driver is stopped first so no new movement tasks appear while the
    /// pool drains. Safe to call twice.
    pub fn stop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        let _ = self.shutdown_tx.try_send(());
        if driver.join().is_err() {
            debug!("spawner thread panicked before joining");
        }
        self.pool.stop();
    }
}

impl Drop for Spawner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_driver(
    world: WorldHandle,
    scheduler: Scheduler,
    config: SpawnConfig,
    shutdown: Receiver<()>,
) {
    let mut rng = SmallRng::from_entropy();
    let mut next_id = 0u32;
    loop {
        match shutdown.recv_timeout(config.interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if let Err(error) = spawn_one(&world, &scheduler, &config, &mut rng, &mut next_id) {
            debug!(%error, "world unavailable, spawner stopping");
            break;
        }
    }
    debug!("spawner thread stopping");
}

/// Admits one raider at a random free corner and schedules its movement.
///
/// An occupied corner skips the round entirely; the identifier counter only
/// advances for raiders that actually enter the grid, so identifiers stay
/// dense.
fn spawn_one(
    world: &WorldHandle,
    scheduler: &Scheduler,
    config: &SpawnConfig,
    rng: &mut SmallRng,
    next_id: &mut u32,
) -> Result<(), SpawnError> {
    let corners = world.bounds().corners();
    let corner = corners[rng.gen_range(0..corners.len())];

    let raiders = world.raider_view()?;
    let occupied = raiders
        .iter()
        .any(|raider| raider.cell == corner || raider.next_cell == Some(corner));
    if occupied {
        debug!(%corner, "spawn corner occupied, skipping this round");
        return Ok(());
    }

    *next_id += 1;
    let id = RaiderId::new(*next_id);
    let cadence = sample_duration(rng, config.cadence_min, config.cadence_max);
    world.submit_raider(RaiderCommand::Admit {
        id,
        cell: corner,
        cadence,
    })?;

    let mut movement = Movement::new(id, corner, world.clone(), config.movement, rng.gen());
    let jitter = sample_duration(rng, Duration::ZERO, config.initial_jitter);
    scheduler.schedule(
        jitter,
        Box::new(move || match movement.step() {
            StepOutcome::Continue => Some(cadence),
            StepOutcome::Retired => None,
        }),
    )?;
    Ok(())
}

fn sample_duration(rng: &mut SmallRng, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    min + (max - min).mul_f64(rng.gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampled_durations_stay_within_bounds() {
        let mut rng = SmallRng::seed_from_u64(3);
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(2000);
        for _ in 0..100 {
            let sample = sample_duration(&mut rng, min, max);
            assert!(sample >= min && sample <= max);
        }
    }

    #[test]
    fn degenerate_range_collapses_to_the_minimum() {
        let mut rng = SmallRng::seed_from_u64(3);
        let value = Duration::from_millis(750);
        assert_eq!(sample_duration(&mut rng, value, value), value);
    }
}
