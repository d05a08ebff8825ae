//! Execution context repository port

use async_trait::async_trait;
use jobledger_core::{ContextOwner, ExecutionContext, Result};

/// Persistence of the context map attached 1:1 to a job or step execution.
#[async_trait]
pub trait ExecutionContextRepository: Send + Sync {
    /// Fetch the context for the given owner. A missing document is not an
    /// error; it decodes to an empty context.
    async fn get(&self, owner: ContextOwner) -> Result<ExecutionContext>;

    /// Upsert the owner's context document, replacing all previous content
    /// wholesale. There is no partial merge.
    async fn save_or_update(&self, owner: ContextOwner, context: &ExecutionContext) -> Result<()>;
}
