//! Core event types and channel helpers.
//!
//! The event loop is single-threaded and cooperative; the only concurrency
//! in the system is long-lived producer threads (input, filesystem watcher,
//! LSP transport readers) which communicate with the loop exclusively over
//! one bounded channel. Producers use blocking sends: with a handful of
//! low-rate producers, parking briefly under backpressure preserves event
//! fidelity, and the counters below keep the behavior observable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{trace, warn};

/// Bounded capacity of the main event channel.
pub const EVENT_CHANNEL_CAP: usize = 8192;

// Telemetry counters: relaxed atomics bumped from producer threads,
// inspected by tests and periodic logging.
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static CHANNEL_BLOCKING_SENDS: AtomicU64 = AtomicU64::new(0);

/// A decoded input key from the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(char),
    Ctrl(char),
    Enter,
    Escape,
    Backspace,
}

/// Top-level event consumed by the central loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Input(InputEvent),
    /// A watched plugin file changed on disk (hot reload trigger).
    PluginFileChanged(PathBuf),
    /// A language server transport produced readable data; the loop should
    /// poll that server.
    LspActivity { server: String },
    /// Periodic tick driving deadline checks and housekeeping.
    Tick,
    Shutdown,
}

pub fn event_channel() -> (Sender<Event>, Receiver<Event>) {
    bounded(EVENT_CHANNEL_CAP)
}

/// Blocking send with telemetry; returns false when the loop is gone.
pub fn send_event(tx: &Sender<Event>, event: Event) -> bool {
    match tx.send(event) {
        Ok(()) => {
            CHANNEL_BLOCKING_SENDS.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(_) => {
            CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// A long-lived background event producer. Implementors spawn one thread
/// that pushes events until the channel closes or their own stop condition
/// fires.
pub trait EventSource: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry collecting sources before the loop starts, spawning them as a
/// batch so ownership of the send side is uniform.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn EventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: EventSource>(&mut self, source: S) {
        self.sources.push(Box::new(source));
    }

    pub fn spawn_all(self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        self.sources
            .into_iter()
            .map(|s| {
                trace!(target: "events.registry", source = s.name(), "spawn_source");
                s.spawn(tx.clone())
            })
            .collect()
    }
}

/// Periodic tick producer.
pub struct TickEventSource {
    interval: Duration,
}

impl TickEventSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl EventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(self.interval);
                if !send_event(&tx, Event::Tick) {
                    warn!(target: "events.tick", "channel closed, tick source exiting");
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trip() {
        let (tx, rx) = event_channel();
        assert!(send_event(&tx, Event::Tick));
        assert_eq!(rx.recv().unwrap(), Event::Tick);
    }

    #[test]
    fn send_failure_counts_after_receiver_drop() {
        let (tx, rx) = event_channel();
        drop(rx);
        let before = CHANNEL_SEND_FAILURES.load(Ordering::Relaxed);
        assert!(!send_event(&tx, Event::Shutdown));
        assert!(CHANNEL_SEND_FAILURES.load(Ordering::Relaxed) > before);
    }

    #[test]
    fn tick_source_emits() {
        let (tx, rx) = event_channel();
        let mut registry = EventSourceRegistry::new();
        registry.register(TickEventSource::new(Duration::from_millis(5)));
        let handles = registry.spawn_all(&tx);
        assert_eq!(handles.len(), 1);
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event, Event::Tick);
        drop(rx); // source notices the closed channel and exits
        for h in handles {
            h.join().unwrap();
        }
    }
}
