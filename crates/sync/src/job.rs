//! Schedulable jobs and their reentrancy guard.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::errors::SyncError;
use crate::reconcile::{PassReport, Reconciler};

/// Unit of work fired by the [`Scheduler`](crate::Scheduler).
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Run one invocation. Failures are handled (logged) inside the job.
    async fn run(&self);
}

/// Non-blocking "already running" flag.
///
/// Entering takes the flag with a compare-and-swap; a second caller gets
/// `None` instead of waiting. The returned token clears the flag when
/// dropped, including during unwinding.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    running: AtomicBool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<RunToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that the holder owns a [`ReentrancyGuard`].
#[derive(Debug)]
pub struct RunToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Periodic registry synchronization for one namespace.
pub struct SyncJob {
    name: String,
    reconciler: Reconciler,
    guard: ReentrancyGuard,
    passes: AtomicU64,
}

impl SyncJob {
    pub fn new(name: impl Into<String>, reconciler: Reconciler) -> Self {
        Self {
            name: name.into(),
            reconciler,
            guard: ReentrancyGuard::new(),
            passes: AtomicU64::new(0),
        }
    }

    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    /// Run a pass unless one is already in flight, in which case `None` is
    /// returned and nothing happens.
    pub async fn trigger(&self) -> Option<Result<PassReport, SyncError>> {
        let Some(_token) = self.guard.try_enter() else {
            debug!(job = %self.name, "previous pass still running, skipping tick");
            metrics::counter!("peerlink_sync_skipped_total", "namespace" => self.reconciler.namespace().to_string(), "reason" => "overlap")
                .increment(1);
            return None;
        };

        let pass_id = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        Some(self.reconciler.run_pass(pass_id).await)
    }
}

#[async_trait]
impl Job for SyncJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) {
        match self.trigger().await {
            Some(Ok(report)) => {
                info!(
                    job = %self.name,
                    pass_id = report.pass_id,
                    added = report.added(),
                    removed = report.removed(),
                    clean = report.is_clean(),
                    "sync job completed"
                );
            }
            Some(Err(err)) => {
                error!(job = %self.name, error = %err, "sync job failed");
            }
            None => {}
        }
    }
}
