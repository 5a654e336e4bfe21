//! Concurrency-safe work queue feeding the worker pool
//!
//! An unbounded FIFO of sessions with an idle-aware dequeue: workers block
//! until work arrives or the idle timeout elapses with nothing delivered.
//! Idle is not an error; the manager treats it as the run's natural
//! termination signal.

use crate::model::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// Unbounded multi-producer multi-consumer session queue
pub struct WorkQueue {
    tx: UnboundedSender<Session>,
    rx: Mutex<UnboundedReceiver<Session>>,
    /// Sessions enqueued but not yet acknowledged via `task_done`
    outstanding: AtomicU64,
    enqueued_total: AtomicU64,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            outstanding: AtomicU64::new(0),
            enqueued_total: AtomicU64::new(0),
        }
    }

    /// Adds a session to the queue
    pub fn enqueue(&self, session: Session) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.enqueued_total.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as the queue, so the send cannot fail.
        let _ = self.tx.send(session);
    }

    /// Waits for the next session, signaling idle after `timeout` with no arrival
    ///
    /// Consumers contend on a single receiver; a consumer that spends the
    /// whole timeout waiting (on the lock or on the channel) without a
    /// delivery observes idle, which is exactly the no-new-work condition.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Session> {
        tokio::time::timeout(timeout, async {
            self.rx.lock().await.recv().await
        })
        .await
        .ok()
        .flatten()
    }

    /// Acknowledges one dequeued session; call exactly once per dequeue
    pub fn task_done(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Sessions enqueued and not yet acknowledged
    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Total sessions ever enqueued
    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::SeqCst)
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
