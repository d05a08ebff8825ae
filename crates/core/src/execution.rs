//! Job execution entity
//!
//! One `JobExecution` is one attempt to run a `JobInstance`. Executions are
//! mutable and version-tracked: every successful update advances `version`
//! by exactly one, and an update submitted with a stale version is rejected
//! by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::status::BatchStatus;
use crate::step::StepExecution;

/// Exit code and human-readable description of a finished execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub exit_code: String,
    pub exit_description: String,
}

impl ExitStatus {
    pub const UNKNOWN: &'static str = "UNKNOWN";
    pub const EXECUTING: &'static str = "EXECUTING";
    pub const COMPLETED: &'static str = "COMPLETED";
    pub const FAILED: &'static str = "FAILED";
    pub const STOPPED: &'static str = "STOPPED";
    pub const NOOP: &'static str = "NOOP";

    pub fn new(exit_code: impl Into<String>, exit_description: impl Into<String>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: exit_description.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN, "")
    }

    pub fn completed() -> Self {
        Self::new(Self::COMPLETED, "")
    }

    pub fn failed() -> Self {
        Self::new(Self::FAILED, "")
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

/// One attempt to execute a job instance.
///
/// `id` and `version` are `None` until the execution has been persisted;
/// the store assigns both on save. The external batch engine owns this
/// object and mutates it between store calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Option<i64>,
    pub job_instance_id: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub create_time: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub version: Option<i32>,
    /// Populated by the step store's `load_all_into`; never persisted as
    /// part of the execution record itself.
    #[serde(default)]
    pub step_executions: Vec<StepExecution>,
}

impl JobExecution {
    /// A fresh, not-yet-persisted execution in `Starting` state.
    pub fn new(job_instance_id: i64) -> Self {
        Self {
            id: None,
            job_instance_id,
            start_time: None,
            end_time: None,
            create_time: Utc::now(),
            last_updated: None,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            version: None,
            step_executions: Vec::new(),
        }
    }

    /// Advance the version: unset becomes 0, otherwise +1.
    pub fn increment_version(&mut self) {
        self.version = Some(match self.version {
            None => 0,
            Some(v) => v + 1,
        });
    }

    /// Apply a status observed in the store without ever downgrading a
    /// completed or failed state.
    pub fn upgrade_status(&mut self, status: BatchStatus) {
        self.status = self.status.upgrade_to(status);
    }

    pub fn is_running(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Executions compare by identity, not by field contents, mirroring how
/// the store deduplicates result sets.
impl PartialEq for JobExecution {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.job_instance_id == other.job_instance_id
    }
}

impl Eq for JobExecution {}

impl Hash for JobExecution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.job_instance_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_execution_is_unpersisted_and_starting() {
        let execution = JobExecution::new(5);
        assert_eq!(execution.id, None);
        assert_eq!(execution.version, None);
        assert_eq!(execution.status, BatchStatus::Starting);
        assert!(execution.is_running());
    }

    #[test]
    fn increment_version_counts_from_unset() {
        let mut execution = JobExecution::new(5);
        execution.increment_version();
        assert_eq!(execution.version, Some(0));
        execution.increment_version();
        assert_eq!(execution.version, Some(1));
    }

    #[test]
    fn upgrade_status_never_downgrades_completion() {
        let mut execution = JobExecution::new(5);
        execution.status = BatchStatus::Completed;
        execution.upgrade_status(BatchStatus::Started);
        assert_eq!(execution.status, BatchStatus::Completed);
    }

    #[test]
    fn equality_is_by_identity() {
        let mut a = JobExecution::new(5);
        let mut b = JobExecution::new(5);
        a.id = Some(1);
        b.id = Some(1);
        b.status = BatchStatus::Failed;
        assert_eq!(a, b);

        b.id = Some(2);
        assert_ne!(a, b);
    }
}
