#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Throttled wall construction pipeline.
//!
//! Construction requests pass two gates. The requesting side refuses a cell
//! outright when the global cap is reached, a wall already stands there, or
//! the bounded pipeline is full. Accepted requests queue up for the single
//! `wall-builder` thread, which re-validates against raiders at build time
//! and enforces a fixed pause between consecutive dequeues, whether or not
//! the dequeued request actually built anything.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use citadel_defence_core::{CellCoord, QueryError, StartError, SubmitError, WallCommand, WALL_CAP};
use citadel_defence_world::WorldHandle;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::debug;

const DEFAULT_QUEUE_CAPACITY: usize = 10;
const DEFAULT_THROTTLE: Duration = Duration::from_secs(2);

/// Sizing and pacing parameters for the construction pipeline.
#[derive(Clone, Copy, Debug)]
pub struct BuilderConfig {
    queue_capacity: usize,
    throttle: Duration,
}

impl BuilderConfig {
    /// Creates a configuration with explicit values.
    #[must_use]
    pub const fn new(queue_capacity: usize, throttle: Duration) -> Self {
        Self {
            queue_capacity,
            throttle,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_THROTTLE)
    }
}

/// Why a construction request was refused at submission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The pipeline already holds its full backlog of pending requests.
    #[error("construction queue is full")]
    QueueFull,
    /// The maximum number of standing walls has been reached.
    #[error("wall cap reached")]
    CapReached,
    /// A wall already stands at the requested cell.
    #[error("a wall already stands at the requested cell")]
    Duplicate,
    /// The builder or the world has shut down.
    #[error("builder is no longer accepting requests")]
    Closed,
}

#[derive(Debug, Error)]
enum BuildError {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Cloneable submission side of the construction pipeline.
#[derive(Clone)]
pub struct BuildRequester {
    requests_tx: Sender<CellCoord>,
    world: WorldHandle,
}

impl BuildRequester {
    /// Requests a wall at `cell`, refusing obviously futile requests early.
    ///
    /// Acceptance is not a guarantee: the builder re-validates against
    /// raiders when the request is finally dequeued, and the world itself
    /// still enforces the cap and placement rules.
    pub fn request(&self, cell: CellCoord) -> Result<(), RequestError> {
        if self.world.wall_count() >= WALL_CAP {
            return Err(RequestError::CapReached);
        }
        let walls = self.world.wall_view().map_err(|_| RequestError::Closed)?;
        if walls.at(cell).is_some() {
            return Err(RequestError::Duplicate);
        }
        self.requests_tx.try_send(cell).map_err(|error| {
            if error.is_full() {
                RequestError::QueueFull
            } else {
                RequestError::Closed
            }
        })
    }

    /// Number of accepted requests still waiting for the builder thread.
    #[must_use]
    pub fn queued_builds(&self) -> usize {
        self.requests_tx.len()
    }
}

/// Owner of the `wall-builder` thread.
pub struct Builder {
    requester: BuildRequester,
    shutdown_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl Builder {
    /// Starts the `wall-builder` thread.
    pub fn start(world: WorldHandle, config: BuilderConfig) -> Result<Self, StartError> {
        let (requests_tx, requests_rx) = bounded(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let builder_world = world.clone();
        let throttle = config.throttle;
        let worker = thread::Builder::new()
            .name("wall-builder".into())
            .spawn(move || run_builder(builder_world, requests_rx, shutdown_rx, throttle))
            .map_err(|source| StartError::Thread {
                name: "wall-builder",
                source,
            })?;
        Ok(Self {
            requester: BuildRequester { requests_tx, world },
            shutdown_tx,
            worker: Some(worker),
        })
    }

    /// Creates a submission handle usable from other threads.
    #[must_use]
    pub fn requester(&self) -> BuildRequester {
        self.requester.clone()
    }

    /// Stops the builder, discarding requests still waiting in the queue.
    /// Safe to call twice.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.shutdown_tx.try_send(());
        if worker.join().is_err() {
            debug!("wall-builder thread panicked before joining");
        }
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_builder(
    world: WorldHandle,
    requests_rx: Receiver<CellCoord>,
    shutdown_rx: Receiver<()>,
    throttle: Duration,
) {
    loop {
        let cell = select! {
            recv(requests_rx) -> request => match request {
                Ok(cell) => cell,
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        };
        if let Err(error) = place(&world, cell) {
            debug!(%error, "world unavailable, wall-builder stopping");
            break;
        }
        // The pause applies per dequeued request, built or skipped.
        match shutdown_rx.recv_timeout(throttle) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("wall-builder thread stopping");
}

/// Build-time validation: a cell a raider stands on, or has reserved, stays
/// clear. The request is consumed either way.
fn place(world: &WorldHandle, cell: CellCoord) -> Result<(), BuildError> {
    let raiders = world.raider_view()?;
    let hostile = raiders
        .iter()
        .any(|raider| raider.cell == cell || raider.next_cell == Some(cell));
    if hostile {
        debug!(%cell, "cell contested by a raider, build skipped");
        return Ok(());
    }
    world.submit_wall(WallCommand::Place { cell })?;
    Ok(())
}
