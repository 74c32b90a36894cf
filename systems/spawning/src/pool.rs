//! Bounded worker pool with delayed, self-rescheduling tasks.
//!
//! A dispatcher thread keeps a due-time ordered queue and hands ripe tasks to
//! a fixed set of worker threads. Workers report the task's verdict back: a
//! delay reschedules the same task, `None` retires it. Shutdown is orderly in
//! the sense that running tasks finish and ripe tasks already handed to
//! workers drain, while tasks still waiting on their delay are discarded.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use citadel_defence_core::{StartError, SubmitError};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

/// Unit of work executed on the pool.
///
/// Returning `Some(delay)` schedules the same task again after the delay;
/// `None` retires it.
pub type Task = Box<dyn FnMut() -> Option<Duration> + Send>;

enum Control {
    Schedule { due: Instant, task: Task },
    Shutdown,
}

struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap surfaces the earliest due time; equal due
    // times fall back to submission order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cloneable submission side of a [`WorkerPool`].
#[derive(Clone)]
pub struct Scheduler {
    control_tx: Sender<Control>,
}

impl Scheduler {
    /// Schedules a task to run once the delay elapses.
    pub fn schedule(&self, delay: Duration, task: Task) -> Result<(), SubmitError> {
        self.control_tx
            .send(Control::Schedule {
                due: Instant::now() + delay,
                task,
            })
            .map_err(|_| SubmitError::Closed)
    }
}

/// Fixed-size pool of worker threads fed by a dispatcher.
pub struct WorkerPool {
    control_tx: Sender<Control>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts the dispatcher and `workers` worker threads (at least one).
    pub fn start(workers: usize) -> Result<Self, StartError> {
        let workers = workers.max(1);
        let (control_tx, control_rx) = unbounded();
        let (work_tx, work_rx) = bounded::<Task>(workers);

        let dispatcher = thread::Builder::new()
            .name("spawn-dispatcher".into())
            .spawn(move || run_dispatcher(control_rx, work_tx))
            .map_err(|source| StartError::Thread {
                name: "spawn-dispatcher",
                source,
            })?;

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let control_tx = control_tx.clone();
            let handle = thread::Builder::new()
                .name("spawn-worker".into())
                .spawn(move || run_worker(work_rx, control_tx))
                .map_err(|source| StartError::Thread {
                    name: "spawn-worker",
                    source,
                })?;
            handles.push(handle);
        }

        Ok(Self {
            control_tx,
            dispatcher: Some(dispatcher),
            workers: handles,
        })
    }

    /// Creates a submission handle usable from other threads.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler {
            control_tx: self.control_tx.clone(),
        }
    }

    /// Stops the pool: the dispatcher discards tasks still waiting on their
    /// delay, workers drain whatever was already ripe, and all threads are
    /// joined. Safe to call twice.
    pub fn stop(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        let _ = self.control_tx.send(Control::Shutdown);
        if dispatcher.join().is_err() {
            warn!("spawn-dispatcher thread panicked before joining");
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("spawn-worker thread panicked before joining");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_dispatcher(control_rx: Receiver<Control>, work_tx: Sender<Task>) {
    let mut queue: BinaryHeap<Entry> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let now = Instant::now();
        if queue.peek().is_some_and(|entry| entry.due <= now) {
            let Some(entry) = queue.pop() else {
                continue;
            };
            if work_tx.send(entry.task).is_err() {
                break;
            }
            continue;
        }
        let message = match queue.peek() {
            Some(entry) => control_rx.recv_timeout(entry.due.saturating_duration_since(now)),
            None => control_rx
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match message {
            Ok(Control::Schedule { due, task }) => {
                queue.push(Entry { due, seq, task });
                seq += 1;
            }
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    if !queue.is_empty() {
        debug!(pending = queue.len(), "discarding tasks still waiting on their delay");
    }
    debug!("spawn-dispatcher thread stopping");
}

fn run_worker(work_rx: Receiver<Task>, control_tx: Sender<Control>) {
    for mut task in work_rx.iter() {
        if let Some(delay) = task() {
            // A failed send means the dispatcher is gone; the task retires.
            let _ = control_tx.send(Control::Schedule {
                due: Instant::now() + delay,
                task,
            });
        }
    }
}
