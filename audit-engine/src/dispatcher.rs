//! Bounded worker pool delivering audit events off the request path.
//!
//! Submission never blocks and never fails the caller. Once accepted, an
//! event belongs to the pool and is delivered even if the submitting task
//! is cancelled. Events that cannot be queued are written to the
//! `audit.dead_letter` tracing target instead.

use crate::entry::AuditEvent;
use crate::error::AuditError;
use crate::service::ActivityService;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEAD_LETTER_TARGET: &str = "audit.dead_letter";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Number of delivery workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Events that may wait for a worker before new ones are dead-lettered.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Delivery counters, sampled with [`AuditDispatcher::stats`].
#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

pub struct AuditDispatcher {
    sender: Mutex<Option<mpsc::Sender<AuditEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl AuditDispatcher {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn start(config: &AuditConfig, service: Arc<dyn ActivityService>) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let service = service.clone();
                let counters = counters.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while waiting for the next event
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else {
                            break;
                        };
                        deliver(worker_id, service.as_ref(), &counters, event).await;
                    }
                    debug!(worker_id, "Audit worker stopped");
                })
            })
            .collect();

        info!(workers, queue_capacity = config.queue_capacity, "Audit dispatcher started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            counters,
        }
    }

    /// Queue an event for delivery. Returns `false` when it was dead-lettered.
    pub fn submit(&self, event: AuditEvent) -> bool {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let result = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(event).map_err(|err| match err {
                TrySendError::Full(event) => (AuditError::QueueFull, event),
                TrySendError::Closed(event) => (AuditError::Closed, event),
            }),
            None => Err((AuditError::Closed, event)),
        };

        match result {
            Ok(()) => true,
            Err((reason, event)) => {
                self.dead_letter(&reason, &event);
                false
            }
        }
    }

    /// Convenience wrapper around [`submit`](Self::submit).
    pub fn log(&self, action: &str, actor: &str, data: serde_json::Value) -> bool {
        self.submit(AuditEvent::new(action, actor, data))
    }

    fn dead_letter(&self, reason: &AuditError, event: &AuditEvent) {
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_string(&event.data).unwrap_or_default();
        warn!(
            target: "audit.dead_letter",
            action = %event.action,
            actor = %event.actor,
            reason = %reason,
            data = %payload,
            "Audit event dropped"
        );
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting events and wait for queued ones to be delivered.
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Audit worker ended abnormally");
            }
        }
        info!(stats = ?self.stats(), "Audit dispatcher stopped");
    }
}

async fn deliver(
    worker_id: usize,
    service: &dyn ActivityService,
    counters: &Counters,
    event: AuditEvent,
) {
    match service.log(&event.action, &event.actor, event.data).await {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker_id,
                action = %event.action,
                actor = %event.actor,
                error = %err,
                "Failed to write audit log"
            );
        }
    }
}
