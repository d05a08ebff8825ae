//! Domain model for the jobledger execution-metadata store
//!
//! This crate contains the entities, value objects, and pure algorithms of
//! the batch metadata store: job instances, executions, steps, the typed
//! execution context, the parameter fingerprint, and the shared error type.
//! It performs no I/O; persistence lives behind the ports crate.

pub mod context;
pub mod error;
pub mod execution;
pub mod instance;
pub mod parameters;
pub mod status;
pub mod step;

pub use crate::context::{ContextOwner, ContextValue, ExecutionContext};
pub use crate::error::BatchError;
pub use crate::execution::{ExitStatus, JobExecution};
pub use crate::instance::JobInstance;
pub use crate::parameters::{JobParameter, JobParameters};
pub use crate::status::BatchStatus;
pub use crate::step::StepExecution;

/// Result alias used across every store component.
pub type Result<T> = std::result::Result<T, BatchError>;
