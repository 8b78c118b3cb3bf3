//! Progress reporting with monotonic counters.
//!
//! Executors push `ProgressUpdate`s through a `ProgressReporter`. The reporter
//! remembers the highest value seen for every counter and never emits a
//! smaller one, so consumers can rely on counters only growing even when
//! updates are re-sent.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_items: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_items: Option<u32>,
}

impl ProgressUpdate {
    pub fn total(total: u32) -> Self {
        Self {
            total_items: Some(total),
            ..Default::default()
        }
    }

    pub fn counts(processed: u32, failed: u32) -> Self {
        Self {
            total_items: None,
            processed_items: Some(processed),
            failed_items: Some(failed),
        }
    }
}

type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Noop,
    Callback(ProgressCallback),
    Channel(mpsc::UnboundedSender<ProgressUpdate>),
}

#[derive(Debug, Default)]
struct Counters {
    total: u32,
    processed: u32,
    failed: u32,
}

#[derive(Clone)]
pub struct ProgressReporter {
    sink: Sink,
    counters: Arc<Mutex<Counters>>,
}

impl ProgressReporter {
    pub fn noop() -> Self {
        Self::with_sink(Sink::Noop)
    }

    pub fn from_callback(callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        Self::with_sink(Sink::Callback(Arc::new(callback)))
    }

    /// Reporter backed by an unbounded channel; the receiver sees every
    /// emitted update in order.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sink(Sink::Channel(tx)), rx)
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sends while the caller still holds the counter lock, so updates leave
    /// in the order the counters moved.
    fn emit(&self, update: ProgressUpdate) {
        match &self.sink {
            Sink::Noop => {}
            Sink::Callback(callback) => callback(update),
            // A dropped receiver only means nobody is listening any more.
            Sink::Channel(tx) => {
                let _ = tx.send(update);
            }
        }
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Emits `update` with every present counter raised to at least its
    /// previously reported value.
    pub fn report(&self, update: ProgressUpdate) {
        let mut counters = self.lock();
        let clamped = ProgressUpdate {
            total_items: update.total_items.map(|v| raise(&mut counters.total, v)),
            processed_items: update
                .processed_items
                .map(|v| raise(&mut counters.processed, v)),
            failed_items: update.failed_items.map(|v| raise(&mut counters.failed, v)),
        };
        self.emit(clamped);
    }

    pub fn set_total(&self, total: usize) {
        self.report(ProgressUpdate::total(saturate(total)));
    }

    /// Records one finished item and emits the new processed/failed counts.
    pub fn item_done(&self, failed: bool) {
        let mut counters = self.lock();
        counters.processed = counters.processed.saturating_add(1);
        if failed {
            counters.failed = counters.failed.saturating_add(1);
        }
        let update = ProgressUpdate::counts(counters.processed, counters.failed);
        self.emit(update);
    }

    /// Current counters as a full update.
    pub fn snapshot(&self) -> ProgressUpdate {
        let counters = self.lock();
        ProgressUpdate {
            total_items: Some(counters.total),
            processed_items: Some(counters.processed),
            failed_items: Some(counters.failed),
        }
    }
}

fn raise(current: &mut u32, value: u32) -> u32 {
    *current = (*current).max(value);
    *current
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
