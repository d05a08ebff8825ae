//! Step execution entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExitStatus;
use crate::status::BatchStatus;

/// One attempt to run a named step within a job execution.
///
/// Carries the progress counters the batch engine accumulates while the
/// step loops over items. Follows the same optimistic-concurrency
/// discipline as `JobExecution`: `id` and `version` are assigned on save
/// and every successful update advances the version by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: Option<i64>,
    pub job_execution_id: i64,
    pub step_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub read_count: i64,
    pub write_count: i64,
    pub filter_count: i64,
    pub read_skip_count: i64,
    pub write_skip_count: i64,
    pub process_skip_count: i64,
    pub rollback_count: i64,
    pub commit_count: i64,
    pub exit_status: ExitStatus,
    pub last_updated: Option<DateTime<Utc>>,
    pub version: Option<i32>,
}

impl StepExecution {
    /// A fresh, not-yet-persisted step execution in `Starting` state.
    pub fn new(step_name: impl Into<String>, job_execution_id: i64) -> Self {
        Self {
            id: None,
            job_execution_id,
            step_name: step_name.into(),
            start_time: Utc::now(),
            end_time: None,
            status: BatchStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            read_skip_count: 0,
            write_skip_count: 0,
            process_skip_count: 0,
            rollback_count: 0,
            commit_count: 0,
            exit_status: ExitStatus::unknown(),
            last_updated: None,
            version: None,
        }
    }

    /// Advance the version: unset becomes 0, otherwise +1.
    pub fn increment_version(&mut self) {
        self.version = Some(match self.version {
            None => 0,
            Some(v) => v + 1,
        });
    }

    /// All progress counters, paired with their persisted field names.
    /// Counters must never go negative; stores validate this before any
    /// write.
    pub fn counters(&self) -> [(&'static str, i64); 8] {
        [
            ("readCount", self.read_count),
            ("writeCount", self.write_count),
            ("filterCount", self.filter_count),
            ("readSkipCount", self.read_skip_count),
            ("writeSkipCount", self.write_skip_count),
            ("processSkipCount", self.process_skip_count),
            ("rollbackCount", self.rollback_count),
            ("commitCount", self.commit_count),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_step_has_zeroed_counters() {
        let step = StepExecution::new("load", 9);
        assert_eq!(step.id, None);
        assert_eq!(step.version, None);
        assert_eq!(step.job_execution_id, 9);
        assert!(step.counters().iter().all(|(_, v)| *v == 0));
    }

    #[test]
    fn increment_version_counts_from_unset() {
        let mut step = StepExecution::new("load", 9);
        step.increment_version();
        assert_eq!(step.version, Some(0));
        step.increment_version();
        assert_eq!(step.version, Some(1));
    }
}
