//! Job execution repository port

use async_trait::async_trait;
use jobledger_core::{JobExecution, JobInstance, Result};
use std::collections::HashSet;

/// Creation, optimistic-concurrency updates, and queries over individual
/// run attempts of a job instance.
#[async_trait]
pub trait JobExecutionRepository: Send + Sync {
    /// Persist a fresh execution: allocates an id, sets the version to 0,
    /// and writes the full record. The execution must not already carry an
    /// id or version.
    async fn save(&self, execution: &mut JobExecution) -> Result<()>;

    /// Conditionally update an already-persisted execution.
    ///
    /// The write is matched on (id, version). If nothing matched, a
    /// follow-up existence check distinguishes the two causes: missing
    /// entirely yields
    /// [`BatchError::NotFound`](jobledger_core::BatchError::NotFound),
    /// present at a different version yields
    /// [`BatchError::ConcurrentModification`](jobledger_core::BatchError::ConcurrentModification)
    /// reporting both versions. On success the in-memory version is
    /// advanced to match the store. Conflicts are never retried here;
    /// retry policy belongs to the caller.
    async fn update(&self, execution: &mut JobExecution) -> Result<()>;

    /// All executions of the instance, descending by execution id.
    async fn find_by_instance(&self, instance: &JobInstance) -> Result<Vec<JobExecution>>;

    /// The single newest execution by create time, if any. More than one
    /// document tied for latest is a fatal consistency violation.
    async fn find_latest_by_instance(&self, instance: &JobInstance)
        -> Result<Option<JobExecution>>;

    /// Executions of the named job that have no end time yet, across all
    /// of the job's instances.
    async fn find_running(&self, job_name: &str) -> Result<HashSet<JobExecution>>;

    async fn find_by_id(&self, execution_id: i64) -> Result<Option<JobExecution>>;

    /// Re-read the stored version; if it differs from the in-memory one,
    /// pull status and version from the store into the given execution
    /// (upgrading, never downgrading, the status). If no stored record
    /// exists yet this is first-time persistence and the record is
    /// created.
    async fn reconcile_status(&self, execution: &mut JobExecution) -> Result<()>;
}
