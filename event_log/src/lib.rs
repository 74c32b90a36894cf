#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Decoupled event log for the Citadel Defence engine.
//!
//! Components publish domain [`Event`]s through a cheaply cloneable
//! [`EventPublisher`]; a dedicated consumer thread drains the queue and
//! writes one display line per event to the configured sink. Producers never
//! block on sink I/O.

use std::io::Write;
use std::thread::{self, JoinHandle};

use citadel_defence_core::{Event, StartError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

enum Message {
    Record(Event),
    Shutdown,
}

/// Best-effort handle used to publish events into the log.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<Message>,
}

impl EventPublisher {
    /// Enqueues an event for the consumer thread.
    ///
    /// Publishing after the log has stopped is silently ignored; event
    /// logging is diagnostic output, not a correctness dependency.
    pub fn publish(&self, event: Event) {
        if self.sender.send(Message::Record(event)).is_err() {
            debug!(%event, "event log stopped, dropping event");
        }
    }
}

/// Owner of the event-log consumer thread.
pub struct EventLog {
    sender: Sender<Message>,
    consumer: Option<JoinHandle<()>>,
}

impl EventLog {
    /// Starts the consumer thread writing display lines to `sink`.
    pub fn start(sink: Box<dyn Write + Send>) -> Result<Self, StartError> {
        let (sender, receiver) = unbounded();
        let consumer = thread::Builder::new()
            .name("event-log".into())
            .spawn(move || run_consumer(receiver, sink))
            .map_err(|source| StartError::Thread {
                name: "event-log",
                source,
            })?;
        Ok(Self {
            sender,
            consumer: Some(consumer),
        })
    }

    /// Creates a publisher handle for producers.
    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher {
            sender: self.sender.clone(),
        }
    }

    /// Stops the consumer thread after flushing all queued events.
    ///
    /// The shutdown sentinel is delivered in FIFO order behind any pending
    /// records, so nothing published before `stop` is lost. Safe to call
    /// more than once.
    pub fn stop(&mut self) {
        let Some(consumer) = self.consumer.take() else {
            return;
        };
        let _ = self.sender.send(Message::Shutdown);
        if consumer.join().is_err() {
            warn!("event-log thread panicked before joining");
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_consumer(receiver: Receiver<Message>, mut sink: Box<dyn Write + Send>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Record(event) => {
                if let Err(error) = writeln!(sink, "{event}") {
                    warn!(%error, "event log sink rejected a line");
                }
            }
            Message::Shutdown => break,
        }
    }
    if let Err(error) = sink.flush() {
        warn!(%error, "event log sink failed to flush");
    }
    debug!("event-log thread stopping");
}
