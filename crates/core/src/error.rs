//! Error types shared across the metadata store

use thiserror::Error;

/// Base error type for the execution-metadata store.
///
/// Every port method returns one of these. Optimistic-concurrency conflicts
/// carry both the submitted and the currently stored version so callers can
/// decide whether to retry, abort, or reconcile.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: id={id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("job instance already exists for job '{job_name}' with key {job_key}")]
    AlreadyExists { job_name: String, job_key: String },

    #[error(
        "attempt to update {entity} id={id} with wrong version ({submitted}), \
         where current version is {current}"
    )]
    ConcurrentModification {
        entity: &'static str,
        id: i64,
        submitted: i32,
        current: i32,
    },

    #[error("store error: {0}")]
    Store(String),
}

impl BatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_modification_reports_both_versions() {
        let err = BatchError::ConcurrentModification {
            entity: "jobExecution",
            id: 7,
            submitted: 2,
            current: 4,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("id=7"));
        assert!(rendered.contains("(2)"));
        assert!(rendered.contains("current version is 4"));
    }

    #[test]
    fn already_exists_names_job_and_key() {
        let err = BatchError::AlreadyExists {
            job_name: "nightly-import".to_string(),
            job_key: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        assert!(err.to_string().contains("nightly-import"));
        assert!(err.to_string().contains("d41d8cd98f00b204e9800998ecf8427e"));
    }
}
