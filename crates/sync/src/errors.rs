use peerlink_network::ObserveError;
use thiserror::Error;

/// Failure that aborts a whole reconciliation pass.
///
/// Per-flavor registry failures do not abort the pass; they are recorded in
/// the flavor's report instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("local peer observation failed: {0}")]
    Observe(#[from] ObserveError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression {expression:?} for job {job}: {reason}")]
    InvalidExpression {
        job: String,
        expression: String,
        reason: String,
    },
    #[error("scheduler already started")]
    AlreadyStarted,
}
