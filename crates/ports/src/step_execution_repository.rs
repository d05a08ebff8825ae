//! Step execution repository port

use async_trait::async_trait;
use jobledger_core::{JobExecution, Result, StepExecution};

/// Creation and optimistic-concurrency updates of step attempts within a
/// job execution. Same discipline as the job execution repository, scoped
/// by `job_execution_id`.
#[async_trait]
pub trait StepExecutionRepository: Send + Sync {
    /// Persist a fresh step execution. The step must not already carry an
    /// id or version; both are assigned here.
    async fn save(&self, step: &mut StepExecution) -> Result<()>;

    /// Conditional-write-then-verify update, matched on (id, version).
    /// Mismatches raise
    /// [`BatchError::ConcurrentModification`](jobledger_core::BatchError::ConcurrentModification)
    /// with both versions, or
    /// [`BatchError::NotFound`](jobledger_core::BatchError::NotFound) for a
    /// step that was never saved.
    async fn update(&self, step: &mut StepExecution) -> Result<()>;

    /// Fetch one step, scoped so the result must belong to the given
    /// execution.
    async fn get(
        &self,
        execution: &JobExecution,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>>;

    /// Replace the execution's step collection with all persisted steps
    /// referencing it, ascending by step execution id.
    async fn load_all_into(&self, execution: &mut JobExecution) -> Result<()>;
}
