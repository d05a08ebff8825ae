//! MongoDB step execution repository
//!
//! Same conditional-write discipline as job executions, scoped to the
//! owning execution on every read.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database, IndexModel};
use tokio::sync::Mutex;
use tracing::{debug, error};

use jobledger_core::{BatchError, ExitStatus, JobExecution, Result, StepExecution};
use jobledger_ports::{entities, CasOutcome, SequenceGenerator, StepExecutionRepository};

use super::{
    collections, fields, get_datetime, get_datetime_opt, get_i32, get_i64, get_string, store_err,
    to_bson_datetime, to_bson_datetime_opt,
};

const ENTITY: &str = "stepExecution";

pub struct MongoStepExecutionRepository {
    collection: Collection<Document>,
    sequence: Arc<dyn SequenceGenerator>,
    update_lock: Mutex<()>,
}

impl MongoStepExecutionRepository {
    pub fn new(db: &Database, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self {
            collection: db.collection(collections::STEP_EXECUTIONS),
            sequence,
            update_lock: Mutex::new(()),
        }
    }

    /// Create the compound index backing execution-scoped lookups.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { fields::STEP_EXECUTION_ID: 1, fields::JOB_EXECUTION_ID: 1 })
                    .build(),
            )
            .await
            .map_err(|e| store_err("failed to create step execution index", e))?;
        Ok(())
    }

    fn validate(step: &StepExecution) -> Result<()> {
        if step.step_name.is_empty() {
            return Err(BatchError::validation("StepExecution step name cannot be empty"));
        }
        for (name, value) in step.counters() {
            if value < 0 {
                return Err(BatchError::validation(format!(
                    "StepExecution counter {name} cannot be negative (was {value})"
                )));
            }
        }
        Ok(())
    }

    fn to_document_without_version(step: &StepExecution, id: i64) -> Document {
        let mut doc = doc! {
            fields::STEP_EXECUTION_ID: id,
            fields::JOB_EXECUTION_ID: step.job_execution_id,
            fields::STEP_NAME: step.step_name.as_str(),
            fields::START_TIME: to_bson_datetime(step.start_time),
            fields::END_TIME: to_bson_datetime_opt(step.end_time),
            fields::STATUS: step.status.as_str(),
            fields::EXIT_CODE: step.exit_status.exit_code.as_str(),
            fields::EXIT_MESSAGE: step.exit_status.exit_description.as_str(),
            fields::LAST_UPDATED: to_bson_datetime_opt(step.last_updated),
        };
        for (name, value) in step.counters() {
            doc.insert(name, Bson::Int64(value));
        }
        doc
    }

    fn map_step(doc: &Document) -> Result<StepExecution> {
        Ok(StepExecution {
            id: Some(get_i64(doc, fields::STEP_EXECUTION_ID)?),
            job_execution_id: get_i64(doc, fields::JOB_EXECUTION_ID)?,
            step_name: get_string(doc, fields::STEP_NAME)?,
            start_time: get_datetime(doc, fields::START_TIME)?,
            end_time: get_datetime_opt(doc, fields::END_TIME)?,
            status: get_string(doc, fields::STATUS)?.parse()?,
            read_count: get_i64(doc, "readCount")?,
            write_count: get_i64(doc, "writeCount")?,
            filter_count: get_i64(doc, "filterCount")?,
            read_skip_count: get_i64(doc, "readSkipCount")?,
            write_skip_count: get_i64(doc, "writeSkipCount")?,
            process_skip_count: get_i64(doc, "processSkipCount")?,
            rollback_count: get_i64(doc, "rollbackCount")?,
            commit_count: get_i64(doc, "commitCount")?,
            exit_status: ExitStatus::new(
                get_string(doc, fields::EXIT_CODE)?,
                get_string(doc, fields::EXIT_MESSAGE)?,
            ),
            last_updated: get_datetime_opt(doc, fields::LAST_UPDATED)?,
            version: Some(get_i32(doc, fields::VERSION)?),
        })
    }

    async fn compare_and_swap(
        &self,
        id: i64,
        expected_version: i32,
        replacement: Document,
    ) -> Result<CasOutcome> {
        let result = self
            .collection
            .replace_one(
                doc! { fields::STEP_EXECUTION_ID: id, fields::VERSION: expected_version },
                replacement,
            )
            .await
            .map_err(|e| store_err("failed to update step execution", e))?;

        if result.matched_count == 1 {
            return Ok(CasOutcome::Updated);
        }

        let stored = self
            .collection
            .find_one(doc! { fields::STEP_EXECUTION_ID: id })
            .projection(doc! { fields::VERSION: 1 })
            .await
            .map_err(|e| store_err("failed to re-read step execution version", e))?;
        match stored {
            Some(doc) => Ok(CasOutcome::StaleVersion {
                current: get_i32(&doc, fields::VERSION)?,
            }),
            None => Ok(CasOutcome::NotFound),
        }
    }
}

#[async_trait]
impl StepExecutionRepository for MongoStepExecutionRepository {
    async fn save(&self, step: &mut StepExecution) -> Result<()> {
        Self::validate(step)?;
        if step.id.is_some() || step.version.is_some() {
            return Err(BatchError::validation(
                "to-be-saved (not updated) StepExecution must not already have an id or version",
            ));
        }

        let id = self.sequence.next_id(entities::STEP_EXECUTION).await?;
        step.id = Some(id);
        step.increment_version();

        let mut doc = Self::to_document_without_version(step, id);
        doc.insert(fields::VERSION, Bson::Int32(step.version.unwrap_or(0)));
        self.collection
            .insert_one(doc)
            .await
            .map_err(|e| store_err("failed to insert step execution", e))?;
        debug!(id, step = step.step_name.as_str(), "saved step execution");
        Ok(())
    }

    async fn update(&self, step: &mut StepExecution) -> Result<()> {
        Self::validate(step)?;
        let id = step.id.ok_or_else(|| {
            BatchError::validation(
                "StepExecution id cannot be unset; it must be saved before it can be updated",
            )
        })?;
        let version = step.version.ok_or_else(|| {
            BatchError::validation(
                "StepExecution version cannot be unset; it must be saved before it can be updated",
            )
        })?;

        let _guard = self.update_lock.lock().await;

        let mut replacement = Self::to_document_without_version(step, id);
        replacement.insert(fields::VERSION, Bson::Int32(version + 1));

        match self.compare_and_swap(id, version, replacement).await? {
            CasOutcome::Updated => {
                step.increment_version();
                Ok(())
            }
            CasOutcome::StaleVersion { current } => {
                error!(id, submitted = version, current, "step execution version conflict");
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

    async fn get(
        &self,
        execution: &JobExecution,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>> {
        let Some(execution_id) = execution.id else {
            return Ok(None);
        };
        let found = self
            .collection
            .find_one(doc! {
                fields::STEP_EXECUTION_ID: step_execution_id,
                fields::JOB_EXECUTION_ID: execution_id,
            })
            .await
            .map_err(|e| store_err("failed to query step execution by id", e))?;
        found.as_ref().map(Self::map_step).transpose()
    }

    async fn load_all_into(&self, execution: &mut JobExecution) -> Result<()> {
        let Some(execution_id) = execution.id else {
            execution.step_executions.clear();
            return Ok(());
        };

        let mut cursor = self
            .collection
            .find(doc! { fields::JOB_EXECUTION_ID: execution_id })
            .sort(doc! { fields::STEP_EXECUTION_ID: 1 })
            .await
            .map_err(|e| store_err("failed to query step executions", e))?;

        let mut steps = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to iterate step executions", e))?
        {
            steps.push(Self::map_step(&doc)?);
        }
        execution.step_executions = steps;
        Ok(())
    }
}
