//! MongoDB implementations of the persistence ports
//!
//! One repository per collection, all sharing the long-lived `Database`
//! handle. Documents are built field by field with `bson::doc!` rather
//! than serde because the execution-context codec needs per-field control
//! over numeric representation.

pub mod codec;
pub mod execution_context_repository;
pub mod job_execution_repository;
pub mod job_instance_repository;
pub mod sequence;
pub mod step_execution_repository;

pub use execution_context_repository::MongoExecutionContextRepository;
pub use job_execution_repository::MongoJobExecutionRepository;
pub use job_instance_repository::MongoJobInstanceRepository;
pub use sequence::MongoSequenceGenerator;
pub use step_execution_repository::MongoStepExecutionRepository;

use std::time::Duration;

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::info;

use jobledger_core::{BatchError, Result};

use crate::config::MongoConfig;

/// Collection names, one per persisted entity type.
pub mod collections {
    pub const JOB_INSTANCES: &str = "jobInstances";
    pub const JOB_EXECUTIONS: &str = "jobExecutions";
    pub const STEP_EXECUTIONS: &str = "stepExecutions";
    pub const EXECUTION_CONTEXTS: &str = "executionContexts";
    pub const SEQUENCES: &str = "sequences";
}

/// Persisted field names shared across the repositories.
pub(crate) mod fields {
    pub const ID: &str = "_id";
    pub const JOB_INSTANCE_ID: &str = "jobInstanceId";
    pub const JOB_EXECUTION_ID: &str = "jobExecutionId";
    pub const STEP_EXECUTION_ID: &str = "stepExecutionId";
    pub const JOB_NAME: &str = "jobName";
    pub const JOB_KEY: &str = "jobKey";
    pub const JOB_PARAMETERS: &str = "jobParameters";
    pub const STEP_NAME: &str = "stepName";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const CREATE_TIME: &str = "createTime";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const STATUS: &str = "status";
    pub const EXIT_CODE: &str = "exitCode";
    pub const EXIT_MESSAGE: &str = "exitMessage";
    pub const VERSION: &str = "version";
}

/// Open the shared database handle from configuration.
pub async fn connect(config: &MongoConfig) -> Result<Database> {
    let mut options = ClientOptions::parse(&config.url)
        .await
        .map_err(|e| BatchError::store(format!("failed to parse MongoDB URL: {e}")))?;
    options.connect_timeout = Some(Duration::from_millis(config.connect_timeout_ms));
    options.server_selection_timeout = Some(Duration::from_millis(config.connect_timeout_ms));

    let client = Client::with_options(options)
        .map_err(|e| BatchError::store(format!("failed to create MongoDB client: {e}")))?;
    info!(database = %config.database, "connected to MongoDB");
    Ok(client.database(&config.database))
}

pub(crate) fn store_err(context: &str, err: mongodb::error::Error) -> BatchError {
    BatchError::store(format!("{context}: {err}"))
}

/// Timestamps cross the BSON boundary as epoch milliseconds, the store's
/// native datetime resolution.
pub(crate) fn to_bson_datetime(value: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_millis(value.timestamp_millis()))
}

/// Nullable timestamps are written as explicit BSON nulls so null-matching
/// filters (e.g. the running-executions query) behave uniformly.
pub(crate) fn to_bson_datetime_opt(value: Option<DateTime<Utc>>) -> Bson {
    match value {
        Some(v) => to_bson_datetime(v),
        None => Bson::Null,
    }
}

pub(crate) fn from_bson_datetime(value: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(DateTime::UNIX_EPOCH)
}

fn malformed(key: &str) -> BatchError {
    BatchError::store(format!("malformed document: missing or mistyped field '{key}'"))
}

pub(crate) fn get_i64(doc: &Document, key: &str) -> Result<i64> {
    doc.get_i64(key).map_err(|_| malformed(key))
}

pub(crate) fn get_i32(doc: &Document, key: &str) -> Result<i32> {
    doc.get_i32(key).map_err(|_| malformed(key))
}

pub(crate) fn get_string(doc: &Document, key: &str) -> Result<String> {
    doc.get_str(key).map(str::to_owned).map_err(|_| malformed(key))
}

pub(crate) fn get_datetime(doc: &Document, key: &str) -> Result<DateTime<Utc>> {
    doc.get_datetime(key)
        .map(|dt| from_bson_datetime(*dt))
        .map_err(|_| malformed(key))
}

pub(crate) fn get_datetime_opt(doc: &Document, key: &str) -> Result<Option<DateTime<Utc>>> {
    match doc.get(key) {
        Some(Bson::DateTime(dt)) => Ok(Some(from_bson_datetime(*dt))),
        Some(Bson::Null) | None => Ok(None),
        Some(_) => Err(malformed(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn datetime_round_trips_at_millisecond_precision() {
        let original = DateTime::from_timestamp_millis(7).unwrap();
        let Bson::DateTime(encoded) = to_bson_datetime(original) else {
            panic!("expected a BSON datetime");
        };
        assert_eq!(from_bson_datetime(encoded), original);
    }

    #[test]
    fn optional_datetime_encodes_none_as_null() {
        assert_eq!(to_bson_datetime_opt(None), Bson::Null);
    }

    #[test]
    fn typed_getters_reject_missing_fields() {
        let doc = doc! { "present": 1_i64 };
        assert!(get_i64(&doc, "present").is_ok());
        assert!(get_i64(&doc, "absent").is_err());
        assert!(get_string(&doc, "present").is_err());
    }

    #[test]
    fn optional_datetime_reads_null_and_missing_as_none() {
        let doc = doc! { "endTime": Bson::Null };
        assert_eq!(get_datetime_opt(&doc, "endTime").unwrap(), None);
        assert_eq!(get_datetime_opt(&doc, "other").unwrap(), None);
    }
}
