//! Job instance repository port

use async_trait::async_trait;
use jobledger_core::{JobInstance, JobParameters, Result};

/// Creation and retrieval of the immutable identity record for one
/// (job name, parameter set) pair.
#[async_trait]
pub trait JobInstanceRepository: Send + Sync {
    /// Create the instance for this (job name, parameters) identity.
    ///
    /// Allocates an id from the sequence generator, computes the job key,
    /// and persists the record at version 0. Fails with
    /// [`BatchError::AlreadyExists`](jobledger_core::BatchError::AlreadyExists)
    /// if an instance with the same (name, key) is already retrievable.
    /// The duplicate check is check-then-create, not atomic across
    /// processes; callers must treat creation as logically transactional
    /// per instance.
    async fn create(&self, job_name: &str, parameters: &JobParameters) -> Result<JobInstance>;

    /// Look up by (job name, fingerprint of `parameters`).
    async fn get_by_name_and_parameters(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobInstance>>;

    async fn get_by_id(&self, instance_id: i64) -> Result<Option<JobInstance>>;

    /// Resolve the instance owning the given job execution.
    async fn get_by_execution(&self, job_execution_id: i64) -> Result<Option<JobInstance>>;

    /// Page through the instances of one job, newest id first.
    /// `start` is a zero-indexed skip count.
    async fn list_by_name(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<JobInstance>>;

    /// All distinct job names, deduplicated, ascending.
    async fn list_job_names(&self) -> Result<Vec<String>>;
}
