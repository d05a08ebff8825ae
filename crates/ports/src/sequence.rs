//! Sequence generator port
//!
//! The document store has no native auto-increment primitive; identifier
//! allocation is an arena-style monotonic counter per entity type, backed
//! by an atomic increment-and-fetch on a counter document. Ids are never
//! allocated client-side because multiple processes share the id space.

use async_trait::async_trait;
use jobledger_core::Result;

/// Well-known counter names, one per persisted entity type.
pub mod entities {
    pub const JOB_INSTANCE: &str = "jobInstance";
    pub const JOB_EXECUTION: &str = "jobExecution";
    pub const STEP_EXECUTION: &str = "stepExecution";
}

/// Produces unique, monotonically increasing 64-bit identifiers per
/// logical entity type.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Atomically increment the counter for `entity_name` and return the
    /// new value. The counter is created at 1 on first use. Concurrent
    /// callers across processes never observe the same value twice.
    async fn next_id(&self, entity_name: &str) -> Result<i64>;
}
