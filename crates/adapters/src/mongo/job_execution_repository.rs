//! MongoDB job execution repository
//!
//! Updates follow the conditional-write-then-verify pattern: the replace is
//! matched on (id, version), the driver's matched-count signal tells us
//! whether anything was written, and a follow-up projection read splits
//! "never existed" from "another writer advanced the version". A
//! per-process critical section guards that sequence; cross-process safety
//! rests entirely on the version match of the conditional write.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database, IndexModel};
use tokio::sync::Mutex;
use tracing::{debug, error};

use jobledger_core::{
    BatchError, BatchStatus, ExitStatus, JobExecution, JobInstance, Result,
};
use jobledger_ports::{entities, CasOutcome, JobExecutionRepository, SequenceGenerator};

use super::{
    collections, fields, get_datetime, get_datetime_opt, get_i32, get_i64, get_string, store_err,
    to_bson_datetime, to_bson_datetime_opt,
};

const ENTITY: &str = "jobExecution";

pub struct MongoJobExecutionRepository {
    collection: Collection<Document>,
    instances: Collection<Document>,
    sequence: Arc<dyn SequenceGenerator>,
    update_lock: Mutex<()>,
}

impl MongoJobExecutionRepository {
    pub fn new(db: &Database, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self {
            collection: db.collection(collections::JOB_EXECUTIONS),
            instances: db.collection(collections::JOB_INSTANCES),
            sequence,
            update_lock: Mutex::new(()),
        }
    }

    /// Create the compound index backing id- and instance-scoped lookups.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { fields::JOB_EXECUTION_ID: 1, fields::JOB_INSTANCE_ID: 1 })
                    .build(),
            )
            .await
            .map_err(|e| store_err("failed to create job execution index", e))?;
        Ok(())
    }

    fn to_document_without_version(execution: &JobExecution, id: i64) -> Document {
        doc! {
            fields::JOB_EXECUTION_ID: id,
            fields::JOB_INSTANCE_ID: execution.job_instance_id,
            fields::START_TIME: to_bson_datetime_opt(execution.start_time),
            fields::END_TIME: to_bson_datetime_opt(execution.end_time),
            fields::CREATE_TIME: to_bson_datetime(execution.create_time),
            fields::LAST_UPDATED: to_bson_datetime_opt(execution.last_updated),
            fields::STATUS: execution.status.as_str(),
            fields::EXIT_CODE: execution.exit_status.exit_code.as_str(),
            fields::EXIT_MESSAGE: execution.exit_status.exit_description.as_str(),
        }
    }

    fn map_execution(doc: &Document) -> Result<JobExecution> {
        Ok(JobExecution {
            id: Some(get_i64(doc, fields::JOB_EXECUTION_ID)?),
            job_instance_id: get_i64(doc, fields::JOB_INSTANCE_ID)?,
            start_time: get_datetime_opt(doc, fields::START_TIME)?,
            end_time: get_datetime_opt(doc, fields::END_TIME)?,
            create_time: get_datetime(doc, fields::CREATE_TIME)?,
            last_updated: get_datetime_opt(doc, fields::LAST_UPDATED)?,
            status: get_string(doc, fields::STATUS)?.parse()?,
            exit_status: ExitStatus::new(
                get_string(doc, fields::EXIT_CODE)?,
                get_string(doc, fields::EXIT_MESSAGE)?,
            ),
            version: Some(get_i32(doc, fields::VERSION)?),
            step_executions: Vec::new(),
        })
    }

    /// Version-matched conditional replace with a three-way outcome.
    async fn compare_and_swap(
        &self,
        id: i64,
        expected_version: i32,
        replacement: Document,
    ) -> Result<CasOutcome> {
        let result = self
            .collection
            .replace_one(
                doc! { fields::JOB_EXECUTION_ID: id, fields::VERSION: expected_version },
                replacement,
            )
            .await
            .map_err(|e| store_err("failed to update job execution", e))?;

        if result.matched_count == 1 {
            return Ok(CasOutcome::Updated);
        }

        let stored = self
            .collection
            .find_one(doc! { fields::JOB_EXECUTION_ID: id })
            .projection(doc! { fields::VERSION: 1 })
            .await
            .map_err(|e| store_err("failed to re-read job execution version", e))?;
        match stored {
            Some(doc) => Ok(CasOutcome::StaleVersion {
                current: get_i32(&doc, fields::VERSION)?,
            }),
            None => Ok(CasOutcome::NotFound),
        }
    }
}

#[async_trait]
impl JobExecutionRepository for MongoJobExecutionRepository {
    async fn save(&self, execution: &mut JobExecution) -> Result<()> {
        if execution.id.is_some() || execution.version.is_some() {
            return Err(BatchError::validation(
                "to-be-saved (not updated) JobExecution must not already have an id or version",
            ));
        }

        let id = self.sequence.next_id(entities::JOB_EXECUTION).await?;
        execution.id = Some(id);
        execution.increment_version();

        let mut doc = Self::to_document_without_version(execution, id);
        doc.insert(fields::VERSION, Bson::Int32(execution.version.unwrap_or(0)));
        self.collection
            .insert_one(doc)
            .await
            .map_err(|e| store_err("failed to insert job execution", e))?;
        debug!(id, instance = execution.job_instance_id, "saved job execution");
        Ok(())
    }

    async fn update(&self, execution: &mut JobExecution) -> Result<()> {
        let id = execution.id.ok_or_else(|| {
            BatchError::validation(
                "JobExecution id cannot be unset; it must be saved before it can be updated",
            )
        })?;
        let version = execution.version.ok_or_else(|| {
            BatchError::validation(
                "JobExecution version cannot be unset; it must be saved before it can be updated",
            )
        })?;

        // The critical section closes a same-process window where a racing
        // update could observe a stale matched-count signal.
        let _guard = self.update_lock.lock().await;

        let mut replacement = Self::to_document_without_version(execution, id);
        replacement.insert(fields::VERSION, Bson::Int32(version + 1));

        match self.compare_and_swap(id, version, replacement).await? {
            CasOutcome::Updated => {
                execution.increment_version();
                Ok(())
            }
            CasOutcome::StaleVersion { current } => {
                error!(id, submitted = version, current, "job execution version conflict");
                Err(BatchError::ConcurrentModification {
                    entity: ENTITY,
                    id,
                    submitted: version,
                    current,
                })
            }
            CasOutcome::NotFound => Err(BatchError::NotFound { entity: ENTITY, id }),
        }
    }

    async fn find_by_instance(&self, instance: &JobInstance) -> Result<Vec<JobExecution>> {
        let mut cursor = self
            .collection
            .find(doc! { fields::JOB_INSTANCE_ID: instance.id })
            .sort(doc! { fields::JOB_EXECUTION_ID: -1 })
            .await
            .map_err(|e| store_err("failed to query job executions by instance", e))?;

        let mut executions = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to iterate job executions", e))?
        {
            executions.push(Self::map_execution(&doc)?);
        }
        Ok(executions)
    }

    async fn find_latest_by_instance(
        &self,
        instance: &JobInstance,
    ) -> Result<Option<JobExecution>> {
        let mut cursor = self
            .collection
            .find(doc! { fields::JOB_INSTANCE_ID: instance.id })
            .sort(doc! { fields::CREATE_TIME: -1 })
            .limit(2)
            .await
            .map_err(|e| store_err("failed to query latest job execution", e))?;

        let newest = match cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to read latest job execution", e))?
        {
            Some(doc) => Self::map_execution(&doc)?,
            None => return Ok(None),
        };

        if let Some(runner_up) = cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to read latest job execution", e))?
        {
            let tied = Self::map_execution(&runner_up)?;
            if tied.create_time == newest.create_time {
                return Err(BatchError::store(format!(
                    "there must be at most one latest job execution for instance id={}",
                    instance.id
                )));
            }
        }
        Ok(Some(newest))
    }

    async fn find_running(&self, job_name: &str) -> Result<HashSet<JobExecution>> {
        let mut instance_cursor = self
            .instances
            .find(doc! { fields::JOB_NAME: job_name })
            .projection(doc! { fields::JOB_INSTANCE_ID: 1 })
            .await
            .map_err(|e| store_err("failed to resolve instances for running query", e))?;

        let mut instance_ids = Vec::new();
        while let Some(doc) = instance_cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to iterate instances for running query", e))?
        {
            instance_ids.push(Bson::Int64(get_i64(&doc, fields::JOB_INSTANCE_ID)?));
        }

        let mut cursor = self
            .collection
            .find(doc! {
                fields::JOB_INSTANCE_ID: { "$in": instance_ids },
                fields::END_TIME: Bson::Null,
            })
            .sort(doc! { fields::JOB_EXECUTION_ID: -1 })
            .await
            .map_err(|e| store_err("failed to query running job executions", e))?;

        let mut running = HashSet::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to iterate running job executions", e))?
        {
            running.insert(Self::map_execution(&doc)?);
        }
        Ok(running)
    }

    async fn find_by_id(&self, execution_id: i64) -> Result<Option<JobExecution>> {
        let found = self
            .collection
            .find_one(doc! { fields::JOB_EXECUTION_ID: execution_id })
            .await
            .map_err(|e| store_err("failed to query job execution by id", e))?;
        found.as_ref().map(Self::map_execution).transpose()
    }

    async fn reconcile_status(&self, execution: &mut JobExecution) -> Result<()> {
        let Some(id) = execution.id else {
            // Never persisted at all: reconciliation degenerates to a save.
            return self.save(execution).await;
        };

        let stored = self
            .collection
            .find_one(doc! { fields::JOB_EXECUTION_ID: id })
            .projection(doc! { fields::VERSION: 1, fields::STATUS: 1 })
            .await
            .map_err(|e| store_err("failed to read job execution for reconciliation", e))?;

        match stored {
            None => {
                // Id allocated but record missing: first-time persistence.
                if execution.version.is_none() {
                    execution.increment_version();
                }
                let mut doc = Self::to_document_without_version(execution, id);
                doc.insert(fields::VERSION, Bson::Int32(execution.version.unwrap_or(0)));
                self.collection
                    .insert_one(doc)
                    .await
                    .map_err(|e| store_err("failed to persist job execution on reconcile", e))?;
                debug!(id, "created job execution during status reconciliation");
                Ok(())
            }
            Some(doc) => {
                let current = get_i32(&doc, fields::VERSION)?;
                if execution.version != Some(current) {
                    let status: BatchStatus = get_string(&doc, fields::STATUS)?.parse()?;
                    execution.upgrade_status(status);
                    execution.version = Some(current);
                    debug!(id, current, "reconciled job execution status from store");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn execution_document_round_trips() {
        let mut execution = JobExecution::new(3);
        execution.create_time = DateTime::from_timestamp_millis(1_000).unwrap();
        execution.start_time = Some(DateTime::from_timestamp_millis(2_000).unwrap());
        execution.status = BatchStatus::Started;
        execution.exit_status = ExitStatus::new(ExitStatus::EXECUTING, "in flight");

        let mut doc = MongoJobExecutionRepository::to_document_without_version(&execution, 9);
        doc.insert(fields::VERSION, Bson::Int32(0));

        let mapped = MongoJobExecutionRepository::map_execution(&doc).unwrap();
        assert_eq!(mapped.id, Some(9));
        assert_eq!(mapped.job_instance_id, 3);
        assert_eq!(mapped.create_time, execution.create_time);
        assert_eq!(mapped.start_time, execution.start_time);
        assert_eq!(mapped.end_time, None);
        assert_eq!(mapped.status, BatchStatus::Started);
        assert_eq!(mapped.exit_status, execution.exit_status);
        assert_eq!(mapped.version, Some(0));
    }

    #[test]
    fn unset_end_time_is_written_as_explicit_null() {
        let execution = JobExecution::new(3);
        let doc = MongoJobExecutionRepository::to_document_without_version(&execution, 9);
        assert_eq!(doc.get(fields::END_TIME), Some(&Bson::Null));
    }
}
