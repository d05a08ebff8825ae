//! Ports - Persistence Abstraction Layer
//!
//! This crate defines the traits the external batch engine programs
//! against. Adapters implement them over a concrete document store; the
//! engine supplies fully-populated domain objects and receives either a
//! populated return value or one of the typed failures from
//! `jobledger_core::BatchError`.

pub mod cas;
pub mod execution_context_repository;
pub mod job_execution_repository;
pub mod job_instance_repository;
pub mod sequence;
pub mod step_execution_repository;

pub use crate::cas::CasOutcome;
pub use crate::execution_context_repository::ExecutionContextRepository;
pub use crate::job_execution_repository::JobExecutionRepository;
pub use crate::job_instance_repository::JobInstanceRepository;
pub use crate::sequence::{entities, SequenceGenerator};
pub use crate::step_execution_repository::StepExecutionRepository;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repositories_are_object_safe() {
        let _instances: Option<Box<dyn JobInstanceRepository>> = None;
        let _executions: Option<Box<dyn JobExecutionRepository>> = None;
        let _steps: Option<Box<dyn StepExecutionRepository>> = None;
        let _contexts: Option<Box<dyn ExecutionContextRepository>> = None;
        let _sequences: Option<Box<dyn SequenceGenerator>> = None;
    }
}
