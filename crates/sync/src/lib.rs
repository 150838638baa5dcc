//! peerlink registry synchronization
//!
//! A [`Reconciler`] runs one pass for one namespace: observe local peers, read
//! and decode both registry lists, probe remote public entries that were not
//! observed live, delete the stale ones in descending index order and append
//! what is missing. [`SyncJob`] wraps a reconciler behind a non-blocking
//! reentrancy guard and [`Scheduler`] fires jobs on cron schedules.

pub mod errors;
pub mod job;
pub mod plan;
pub mod reconcile;
pub mod scheduler;

pub use errors::{ScheduleError, SyncError};
pub use job::{Job, ReentrancyGuard, RunToken, SyncJob};
pub use plan::{plan_flavor, FlavorPlan};
pub use reconcile::{FlavorReport, PassReport, Reconciler};
pub use scheduler::{JobId, Scheduler};
