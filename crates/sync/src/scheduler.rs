//! Cron-driven job scheduler.
//!
//! Expressions use six fields with seconds resolution
//! (`sec min hour day-of-month month day-of-week`), e.g. `0/5 * * * * *`.

use chrono::Utc;
use cron::Schedule;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::ScheduleError;
use crate::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

struct Registration {
    id: JobId,
    expression: String,
    schedule: Schedule,
    job: Arc<dyn Job>,
}

#[derive(Default)]
pub struct Scheduler {
    registrations: Vec<Registration>,
    tasks: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, expression: &str, job: Arc<dyn Job>) -> Result<JobId, ScheduleError> {
        let schedule = Schedule::from_str(expression.trim()).map_err(|err| {
            ScheduleError::InvalidExpression {
                job: job.name().to_string(),
                expression: expression.to_string(),
                reason: err.to_string(),
            }
        })?;

        self.next_id += 1;
        let id = JobId(self.next_id);
        info!(
            job = %job.name(),
            job_id = %id,
            expression,
            "scheduled job {} with expression {:?}",
            job.name(),
            expression
        );
        self.registrations.push(Registration {
            id,
            expression: expression.to_string(),
            schedule,
            job,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Spawn one timer task per registered job.
    pub fn start(&mut self) -> Result<(), ScheduleError> {
        if self.is_running() {
            return Err(ScheduleError::AlreadyStarted);
        }

        for registration in &self.registrations {
            let id = registration.id;
            let expression = registration.expression.clone();
            let schedule = registration.schedule.clone();
            let job = registration.job.clone();

            self.tasks.push(tokio::spawn(async move {
                let mut after = Utc::now();
                loop {
                    let Some(next) = schedule.after(&after).next() else {
                        warn!(job = %job.name(), job_id = %id, %expression, "schedule has no further occurrences");
                        break;
                    };
                    let wait = (next - Utc::now()).to_std().unwrap_or_default();
                    tokio::time::sleep(wait).await;
                    after = next;

                    // Not awaited: an overlapping tick must reach the job's own guard.
                    tokio::spawn(invoke(id, job.clone()));
                }
            }));
        }

        info!(jobs = self.tasks.len(), "scheduler started");
        Ok(())
    }

    /// Stop all timer tasks. Invocations already in flight run to completion.
    pub fn shutdown(&mut self) {
        let stopped = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if stopped > 0 {
            info!(jobs = stopped, "scheduler stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn invoke(id: JobId, job: Arc<dyn Job>) {
    if let Err(panic) = AssertUnwindSafe(job.run()).catch_unwind().await {
        error!(
            job = %job.name(),
            job_id = %id,
            panic = %panic_message(panic.as_ref()),
            "job invocation panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
