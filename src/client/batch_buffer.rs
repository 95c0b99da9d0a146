use crate::protocol::LogMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// The messages released by one flush, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSnapshot {
    generation: u64,
    messages: Vec<LogMessage>,
}

impl BatchSnapshot {
    pub fn new(generation: u64, messages: Vec<LogMessage>) -> Self {
        Self { generation, messages }
    }

    /// Number of `clear_buffer` calls that preceded this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<LogMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A scheduled flush. Cancelling the token stops the sleeping task; the id
/// guards against a task that already woke up before the cancel landed.
#[derive(Debug)]
struct FlushTimer {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct PendingBuffer {
    messages: Vec<LogMessage>,
    timer: Option<FlushTimer>,
    next_timer_id: u64,
}

#[derive(Debug)]
struct Shared {
    pending: Mutex<PendingBuffer>,
    generation: Arc<AtomicU64>,
    snapshots: mpsc::UnboundedSender<BatchSnapshot>,
    interval: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PendingBuffer> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_timer(&self, id: u64) {
        let mut pending = self.lock();

        // Cancelled or superseded while this task was waking up
        if pending.timer.as_ref().map(|t| t.id) != Some(id) {
            return;
        }
        pending.timer = None;

        if pending.messages.is_empty() {
            return;
        }

        let messages = std::mem::take(&mut pending.messages);
        trace!(count = messages.len(), "Flushing log batch");
        let generation = self.generation.load(Ordering::Acquire);
        let _ = self.snapshots.send(BatchSnapshot::new(generation, messages));
    }
}

/// Coalesces incoming log messages and releases them at most once per
/// flush interval.
///
/// Cloning yields another handle to the same buffer. `push` schedules the
/// flush timer with `tokio::spawn`, so it must run inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    shared: Arc<Shared>,
}

impl BatchBuffer {
    pub fn new(interval: Duration) -> (BatchBuffer, BatchReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingBuffer::default()),
            generation: generation.clone(),
            snapshots: tx,
            interval,
        });
        (BatchBuffer { shared }, BatchReceiver { rx, generation })
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Queue a message, scheduling a flush if none is pending.
    pub fn push(&self, message: LogMessage) {
        let mut pending = self.shared.lock();
        pending.messages.push(message);

        if pending.timer.is_some() {
            return;
        }

        let id = pending.next_timer_id;
        pending.next_timer_id += 1;
        let cancel = CancellationToken::new();
        pending.timer = Some(FlushTimer {
            id,
            cancel: cancel.clone(),
        });
        drop(pending);

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let interval = self.shared.interval;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    if let Some(shared) = shared.upgrade() {
                        shared.on_timer(id);
                    }
                }
            }
        });
    }

    /// Drop everything pending, cancel the scheduled flush, and publish an
    /// empty snapshot so consumers observe the clear immediately.
    ///
    /// Snapshots published before the clear but not yet received are
    /// skipped by `BatchReceiver`.
    pub fn clear_buffer(&self) {
        let mut pending = self.shared.lock();
        let dropped = pending.messages.len();
        pending.messages.clear();
        if let Some(timer) = pending.timer.take() {
            timer.cancel.cancel();
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self
            .shared
            .snapshots
            .send(BatchSnapshot::new(generation, Vec::new()));
        trace!(dropped, generation, "Batch buffer cleared");
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().messages.len()
    }

    pub fn has_scheduled_flush(&self) -> bool {
        self.shared.lock().timer.is_some()
    }
}

/// Consumer side of a `BatchBuffer`. Each snapshot is delivered once.
#[derive(Debug)]
pub struct BatchReceiver {
    rx: mpsc::UnboundedReceiver<BatchSnapshot>,
    generation: Arc<AtomicU64>,
}

impl BatchReceiver {
    /// Wait for the next snapshot that has not been invalidated by a clear.
    ///
    /// Returns None once every `BatchBuffer` handle has been dropped.
    pub async fn recv(&mut self) -> Option<BatchSnapshot> {
        loop {
            let snapshot = self.rx.recv().await?;
            if self.is_current(&snapshot) {
                return Some(snapshot);
            }
        }
    }

    /// Non-blocking variant of `recv`.
    pub fn try_recv(&mut self) -> Option<BatchSnapshot> {
        while let Ok(snapshot) = self.rx.try_recv() {
            if self.is_current(&snapshot) {
                return Some(snapshot);
            }
        }
        None
    }

    fn is_current(&self, snapshot: &BatchSnapshot) -> bool {
        snapshot.generation >= self.generation.load(Ordering::Acquire)
    }
}
