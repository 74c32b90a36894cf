#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for Citadel Defence.
//!
//! [`WorldState`] owns the raider and wall collections and mutates them on a
//! single dedicated actor thread. Producers hold a cloneable [`WorldHandle`]
//! and communicate exclusively through two bounded command channels, one per
//! entity kind. Snapshot queries resolve caller-supplied callbacks on the
//! actor thread; a handful of scalar getters (score, wall count, game-over)
//! bypass the queues entirely so frequent display polling never competes with
//! the command backlog.

mod state;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use citadel_defence_core::{
    GridBounds, QueryError, RaiderCommand, RaiderQueryFn, RaiderView, StartError, SubmitError,
    WallCommand, WallQueryFn, WallView, TICK_SCORE,
};
use citadel_defence_event_log::EventPublisher;
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use state::State;

const DEFAULT_QUEUE_CAPACITY: usize = 30;
const DEFAULT_SCORE_TICK: Duration = Duration::from_secs(1);

/// Configuration parameters required to start the world actor.
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {
    bounds: GridBounds,
    score_tick: Duration,
    queue_capacity: usize,
}

impl WorldConfig {
    /// Creates a configuration with explicit values.
    #[must_use]
    pub const fn new(bounds: GridBounds, score_tick: Duration, queue_capacity: usize) -> Self {
        Self {
            bounds,
            score_tick,
            queue_capacity,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new(GridBounds::default(), DEFAULT_SCORE_TICK, DEFAULT_QUEUE_CAPACITY)
    }
}

/// Scalar state shared between the actor, the score ticker and pollers.
///
/// Kept outside the command queues on purpose: the display layer polls these
/// values many times per second and must not contend with queued mutations.
#[derive(Debug, Default)]
pub(crate) struct Scalars {
    score: Mutex<u64>,
    game_over: AtomicBool,
    wall_count: AtomicUsize,
}

impl Scalars {
    pub(crate) fn add_score(&self, amount: u64) {
        let mut score = self.score.lock().expect("score mutex poisoned");
        *score += amount;
    }

    pub(crate) fn score(&self) -> u64 {
        *self.score.lock().expect("score mutex poisoned")
    }

    pub(crate) fn set_game_over(&self) {
        self.game_over.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_game_over(&self) -> bool {
        self.game_over.load(Ordering::SeqCst)
    }

    pub(crate) fn set_wall_count(&self, count: usize) {
        self.wall_count.store(count, Ordering::SeqCst);
    }

    pub(crate) fn wall_count(&self) -> usize {
        self.wall_count.load(Ordering::SeqCst)
    }
}

/// Cloneable producer-side handle onto the world actor.
#[derive(Clone)]
pub struct WorldHandle {
    raider_tx: Sender<RaiderCommand>,
    wall_tx: Sender<WallCommand>,
    scalars: Arc<Scalars>,
    bounds: GridBounds,
}

impl WorldHandle {
    /// Bounds of the playing field the world was started with.
    #[must_use]
    pub const fn bounds(&self) -> GridBounds {
        self.bounds
    }

    /// Submits a raider mutation, blocking while the queue is full.
    pub fn submit_raider(&self, command: RaiderCommand) -> Result<(), SubmitError> {
        self.raider_tx
            .send(command)
            .map_err(|_| SubmitError::Closed)
    }

    /// Submits a wall mutation, blocking while the queue is full.
    pub fn submit_wall(&self, command: WallCommand) -> Result<(), SubmitError> {
        self.wall_tx.send(command).map_err(|_| SubmitError::Closed)
    }

    /// Enqueues a raider snapshot query resolved on the actor thread.
    ///
    /// The callback must be quick and must not submit further raider
    /// commands: it runs inside the actor's processing loop, and the loop is
    /// the only consumer of that queue.
    pub fn query_raiders(&self, callback: RaiderQueryFn) -> Result<(), SubmitError> {
        self.submit_raider(RaiderCommand::Query { callback })
    }

    /// Enqueues a wall snapshot query resolved on the actor thread.
    ///
    /// The same restrictions as [`WorldHandle::query_raiders`] apply.
    pub fn query_walls(&self, callback: WallQueryFn) -> Result<(), SubmitError> {
        self.submit_wall(WallCommand::Query { callback })
    }

    /// Resolves a raider view, blocking until the actor reaches the query.
    pub fn raider_view(&self) -> Result<RaiderView, QueryError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.query_raiders(Box::new(move |view| {
            let _ = reply_tx.send(view.clone());
        }))
        .map_err(|_| QueryError::Closed)?;
        reply_rx.recv().map_err(|_| QueryError::Dropped)
    }

    /// Resolves a wall view, blocking until the actor reaches the query.
    pub fn wall_view(&self) -> Result<WallView, QueryError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.query_walls(Box::new(move |view| {
            let _ = reply_tx.send(view.clone());
        }))
        .map_err(|_| QueryError::Closed)?;
        reply_rx.recv().map_err(|_| QueryError::Dropped)
    }

    /// Current score; may trail commands still queued.
    #[must_use]
    pub fn score(&self) -> u64 {
        self.scalars.score()
    }

    /// Number of walls currently standing.
    #[must_use]
    pub fn wall_count(&self) -> usize {
        self.scalars.wall_count()
    }

    /// Whether a raider has breached the citadel; latches once set.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.scalars.is_game_over()
    }
}

/// Owner of the world actor thread and the score ticker.
pub struct WorldState {
    handle: WorldHandle,
    running: Arc<AtomicBool>,
    actor: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
    ticker_tx: Sender<()>,
}

impl WorldState {
    /// Starts the `world-state` actor thread and the `score-ticker`.
    pub fn start(config: WorldConfig, events: EventPublisher) -> Result<Self, StartError> {
        let (raider_tx, raider_rx) = bounded(config.queue_capacity);
        let (wall_tx, wall_rx) = bounded(config.queue_capacity);
        let scalars = Arc::new(Scalars::default());
        let running = Arc::new(AtomicBool::new(true));

        let state = State::new(config.bounds, Arc::clone(&scalars), events);
        let actor_running = Arc::clone(&running);
        let actor = thread::Builder::new()
            .name("world-state".into())
            .spawn(move || run_actor(state, raider_rx, wall_rx, actor_running))
            .map_err(|source| StartError::Thread {
                name: "world-state",
                source,
            })?;

        let (ticker_tx, ticker_rx) = bounded(1);
        let ticker_scalars = Arc::clone(&scalars);
        let tick = config.score_tick;
        let ticker = thread::Builder::new()
            .name("score-ticker".into())
            .spawn(move || run_ticker(ticker_rx, ticker_scalars, tick))
            .map_err(|source| StartError::Thread {
                name: "score-ticker",
                source,
            })?;

        Ok(Self {
            handle: WorldHandle {
                raider_tx,
                wall_tx,
                scalars,
                bounds: config.bounds,
            },
            running,
            actor: Some(actor),
            ticker: Some(ticker),
            ticker_tx,
        })
    }

    /// Creates a producer handle for other components.
    #[must_use]
    pub fn handle(&self) -> WorldHandle {
        self.handle.clone()
    }

    /// Stops the actor and the ticker, draining commands already submitted.
    ///
    /// The running flag is cleared first, then one poison [`RaiderCommand::Noop`]
    /// and [`WallCommand::Noop`] wake the actor if it is parked on empty
    /// queues (`try_send` suffices: a full queue means the actor is already
    /// awake). The actor drains both queues before exiting, so commands
    /// accepted before shutdown are never lost mid-queue. Safe to call twice.
    pub fn stop(&mut self) {
        let Some(actor) = self.actor.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.raider_tx.try_send(RaiderCommand::Noop);
        let _ = self.handle.wall_tx.try_send(WallCommand::Noop);
        if actor.join().is_err() {
            warn!("world-state thread panicked before joining");
        }
        let _ = self.ticker_tx.try_send(());
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                warn!("score-ticker thread panicked before joining");
            }
        }
    }
}

impl Drop for WorldState {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Actor loop: strict alternation between the two command queues.
///
/// Each iteration applies at most one pending raider command and then at most
/// one pending wall command, so neither kind can starve the other by more
/// than a single command. Only when both queues are empty does the loop block
/// until either channel delivers.
fn run_actor(
    mut state: State,
    raider_rx: Receiver<RaiderCommand>,
    wall_rx: Receiver<WallCommand>,
    running: Arc<AtomicBool>,
) {
    debug!("world-state thread running");
    while running.load(Ordering::SeqCst) {
        let mut progressed = false;
        if let Ok(command) = raider_rx.try_recv() {
            state.apply_raider(command);
            progressed = true;
        }
        if let Ok(command) = wall_rx.try_recv() {
            state.apply_wall(command);
            progressed = true;
        }
        if progressed {
            continue;
        }
        select! {
            recv(raider_rx) -> command => match command {
                Ok(command) => state.apply_raider(command),
                Err(_) => break,
            },
            recv(wall_rx) -> command => match command {
                Ok(command) => state.apply_wall(command),
                Err(_) => break,
            },
        }
    }

    // Producers are told to quiesce before the world; whatever they managed
    // to submit still gets applied rather than dropped mid-queue.
    while let Ok(command) = raider_rx.try_recv() {
        state.apply_raider(command);
    }
    while let Ok(command) = wall_rx.try_recv() {
        state.apply_wall(command);
    }
    debug!("world-state thread stopping");
}

fn run_ticker(shutdown: Receiver<()>, scalars: Arc<Scalars>, period: Duration) {
    if period.is_zero() {
        let _ = shutdown.recv();
        return;
    }
    loop {
        match shutdown.recv_timeout(period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => scalars.add_score(TICK_SCORE),
        }
    }
    debug!("score-ticker thread stopping");
}
