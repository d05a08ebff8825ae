//! In-memory repository implementations
//!
//! Backed by one shared [`InMemoryDatabase`] so the repositories see each
//! other's writes the way the MongoDB adapters do through one database.
//! Used by tests and by embedded deployments that do not need durability.
//! Semantics match the MongoDB adapters, including the three-way outcome
//! of a version-matched update.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use jobledger_core::{
    BatchError, ContextOwner, ExecutionContext, JobExecution, JobInstance, JobParameters, Result,
    StepExecution,
};
use jobledger_ports::{
    entities, CasOutcome, ExecutionContextRepository, JobExecutionRepository,
    JobInstanceRepository, SequenceGenerator, StepExecutionRepository,
};

#[derive(Default)]
struct Tables {
    sequences: HashMap<String, i64>,
    instances: HashMap<i64, JobInstance>,
    executions: HashMap<i64, JobExecution>,
    steps: HashMap<i64, StepExecution>,
    contexts: HashMap<ContextOwner, ExecutionContext>,
}

/// Shared backing store for the in-memory repositories.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct InMemorySequenceGenerator {
    db: Arc<InMemoryDatabase>,
}

impl InMemorySequenceGenerator {
    pub fn new(db: Arc<InMemoryDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequenceGenerator {
    async fn next_id(&self, entity_name: &str) -> Result<i64> {
        let mut tables = self.db.tables.write().await;
        let counter = tables.sequences.entry(entity_name.to_owned()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

pub struct InMemoryJobInstanceRepository {
    db: Arc<InMemoryDatabase>,
    sequence: Arc<dyn SequenceGenerator>,
}

impl InMemoryJobInstanceRepository {
    pub fn new(db: Arc<InMemoryDatabase>, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self { db, sequence }
    }
}

#[async_trait]
impl JobInstanceRepository for InMemoryJobInstanceRepository {
    async fn create(&self, job_name: &str, parameters: &JobParameters) -> Result<JobInstance> {
        if job_name.is_empty() {
            return Err(BatchError::validation("job name cannot be empty"));
        }
        let job_key = parameters.job_key();
        {
            let tables = self.db.tables.read().await;
            if tables
                .instances
                .values()
                .any(|i| i.job_name == job_name && i.job_key == job_key)
            {
                return Err(BatchError::AlreadyExists {
                    job_name: job_name.to_owned(),
                    job_key,
                });
            }
        }

        let id = self.sequence.next_id(entities::JOB_INSTANCE).await?;
        let instance = JobInstance::new(id, job_name, parameters.clone());
        self.db
            .tables
            .write()
            .await
            .instances
            .insert(id, instance.clone());
        debug!(id, job_name, "created job instance");
        Ok(instance)
    }

    async fn get_by_name_and_parameters(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobInstance>> {
        let job_key = parameters.job_key();
        let tables = self.db.tables.read().await;
        Ok(tables
            .instances
            .values()
            .find(|i| i.job_name == job_name && i.job_key == job_key)
            .cloned())
    }

    async fn get_by_id(&self, instance_id: i64) -> Result<Option<JobInstance>> {
        let tables = self.db.tables.read().await;
        Ok(tables.instances.get(&instance_id).cloned())
    }

    async fn get_by_execution(&self, job_execution_id: i64) -> Result<Option<JobInstance>> {
        let tables = self.db.tables.read().await;
        let Some(execution) = tables.executions.get(&job_execution_id) else {
            return Ok(None);
        };
        Ok(tables.instances.get(&execution.job_instance_id).cloned())
    }

    async fn list_by_name(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<JobInstance>> {
        let tables = self.db.tables.read().await;
        let mut matching: Vec<JobInstance> = tables
            .instances
            .values()
            .filter(|i| i.job_name == job_name)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matching.into_iter().skip(start).take(count).collect())
    }

    async fn list_job_names(&self) -> Result<Vec<String>> {
        let tables = self.db.tables.read().await;
        let mut names: Vec<String> = tables
            .instances
            .values()
            .map(|i| i.job_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }
}

pub struct InMemoryJobExecutionRepository {
    db: Arc<InMemoryDatabase>,
    sequence: Arc<dyn SequenceGenerator>,
}

impl InMemoryJobExecutionRepository {
    pub fn new(db: Arc<InMemoryDatabase>, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self { db, sequence }
    }

    /// Version-matched replace under the table write lock, mirroring the
    /// conditional write of the MongoDB adapter.
    fn compare_and_swap(
        tables: &mut Tables,
        id: i64,
        expected_version: i32,
        mut replacement: JobExecution,
    ) -> CasOutcome {
        match tables.executions.get(&id) {
            None => CasOutcome::NotFound,
            Some(stored) if stored.version != Some(expected_version) => CasOutcome::StaleVersion {
                current: stored.version.unwrap_or(0),
            },
            Some(_) => {
                replacement.version = Some(expected_version + 1);
                tables.executions.insert(id, replacement);
                CasOutcome::Updated
            }
        }
    }
}

#[async_trait]
impl JobExecutionRepository for InMemoryJobExecutionRepository {
    async fn save(&self, execution: &mut JobExecution) -> Result<()> {
        if execution.id.is_some() || execution.version.is_some() {
            return Err(BatchError::validation(
                "to-be-saved (not updated) JobExecution must not already have an id or version",
            ));
        }
        let id = self.sequence.next_id(entities::JOB_EXECUTION).await?;
        execution.id = Some(id);
        execution.increment_version();
        self.db
            .tables
            .write()
            .await
            .executions
            .insert(id, execution.clone());
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

        let mut tables = self.db.tables.write().await;
        match Self::compare_and_swap(&mut tables, id, version, execution.clone()) {
            CasOutcome::Updated => {
                execution.increment_version();
                Ok(())
            }
            CasOutcome::StaleVersion { current } => Err(BatchError::ConcurrentModification {
                entity: "jobExecution",
                id,
                submitted: version,
                current,
            }),
            CasOutcome::NotFound => Err(BatchError::NotFound {
                entity: "jobExecution",
                id,
            }),
        }
    }

    async fn find_by_instance(&self, instance: &JobInstance) -> Result<Vec<JobExecution>> {
        let tables = self.db.tables.read().await;
        let mut executions: Vec<JobExecution> = tables
            .executions
            .values()
            .filter(|e| e.job_instance_id == instance.id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(executions)
    }

    async fn find_latest_by_instance(
        &self,
        instance: &JobInstance,
    ) -> Result<Option<JobExecution>> {
        let tables = self.db.tables.read().await;
        let mut executions: Vec<&JobExecution> = tables
            .executions
            .values()
            .filter(|e| e.job_instance_id == instance.id)
            .collect();
        executions.sort_by(|a, b| b.create_time.cmp(&a.create_time));

        match executions.as_slice() {
            [] => Ok(None),
            [newest, runner_up, ..] if newest.create_time == runner_up.create_time => {
                Err(BatchError::store(format!(
                    "there must be at most one latest job execution for instance id={}",
                    instance.id
                )))
            }
            [newest, ..] => Ok(Some((*newest).clone())),
        }
    }

    async fn find_running(&self, job_name: &str) -> Result<HashSet<JobExecution>> {
        let tables = self.db.tables.read().await;
        let instance_ids: HashSet<i64> = tables
            .instances
            .values()
            .filter(|i| i.job_name == job_name)
            .map(|i| i.id)
            .collect();
        Ok(tables
            .executions
            .values()
            .filter(|e| instance_ids.contains(&e.job_instance_id) && e.end_time.is_none())
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, execution_id: i64) -> Result<Option<JobExecution>> {
        let tables = self.db.tables.read().await;
        Ok(tables.executions.get(&execution_id).cloned())
    }

    async fn reconcile_status(&self, execution: &mut JobExecution) -> Result<()> {
        let Some(id) = execution.id else {
            return self.save(execution).await;
        };

        let mut tables = self.db.tables.write().await;
        match tables.executions.get(&id) {
            None => {
                if execution.version.is_none() {
                    execution.increment_version();
                }
                tables.executions.insert(id, execution.clone());
                Ok(())
            }
            Some(stored) => {
                if execution.version != stored.version {
                    execution.upgrade_status(stored.status);
                    execution.version = stored.version;
                }
                Ok(())
            }
        }
    }
}

pub struct InMemoryStepExecutionRepository {
    db: Arc<InMemoryDatabase>,
    sequence: Arc<dyn SequenceGenerator>,
}

impl InMemoryStepExecutionRepository {
    pub fn new(db: Arc<InMemoryDatabase>, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self { db, sequence }
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

    fn compare_and_swap(
        tables: &mut Tables,
        id: i64,
        expected_version: i32,
        mut replacement: StepExecution,
    ) -> CasOutcome {
        match tables.steps.get(&id) {
            None => CasOutcome::NotFound,
            Some(stored) if stored.version != Some(expected_version) => CasOutcome::StaleVersion {
                current: stored.version.unwrap_or(0),
            },
            Some(_) => {
                replacement.version = Some(expected_version + 1);
                tables.steps.insert(id, replacement);
                CasOutcome::Updated
            }
        }
    }
}

#[async_trait]
impl StepExecutionRepository for InMemoryStepExecutionRepository {
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
        self.db.tables.write().await.steps.insert(id, step.clone());
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

        let mut tables = self.db.tables.write().await;
        match Self::compare_and_swap(&mut tables, id, version, step.clone()) {
            CasOutcome::Updated => {
                step.increment_version();
                Ok(())
            }
            CasOutcome::StaleVersion { current } => Err(BatchError::ConcurrentModification {
                entity: "stepExecution",
                id,
                submitted: version,
                current,
            }),
            CasOutcome::NotFound => Err(BatchError::NotFound {
                entity: "stepExecution",
                id,
            }),
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
        let tables = self.db.tables.read().await;
        Ok(tables
            .steps
            .get(&step_execution_id)
            .filter(|s| s.job_execution_id == execution_id)
            .cloned())
    }

    async fn load_all_into(&self, execution: &mut JobExecution) -> Result<()> {
        let Some(execution_id) = execution.id else {
            execution.step_executions.clear();
            return Ok(());
        };
        let tables = self.db.tables.read().await;
        let mut steps: Vec<StepExecution> = tables
            .steps
            .values()
            .filter(|s| s.job_execution_id == execution_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.id);
        execution.step_executions = steps;
        Ok(())
    }
}

pub struct InMemoryExecutionContextRepository {
    db: Arc<InMemoryDatabase>,
}

impl InMemoryExecutionContextRepository {
    pub fn new(db: Arc<InMemoryDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExecutionContextRepository for InMemoryExecutionContextRepository {
    async fn get(&self, owner: ContextOwner) -> Result<ExecutionContext> {
        let tables = self.db.tables.read().await;
        Ok(tables.contexts.get(&owner).cloned().unwrap_or_default())
    }

    async fn save_or_update(&self, owner: ContextOwner, context: &ExecutionContext) -> Result<()> {
        self.db
            .tables
            .write()
            .await
            .contexts
            .insert(owner, context.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repositories() -> (
        InMemoryJobInstanceRepository,
        InMemoryJobExecutionRepository,
        InMemoryStepExecutionRepository,
        InMemoryExecutionContextRepository,
    ) {
        let db = InMemoryDatabase::new();
        let sequence: Arc<dyn SequenceGenerator> =
            Arc::new(InMemorySequenceGenerator::new(db.clone()));
        (
            InMemoryJobInstanceRepository::new(db.clone(), sequence.clone()),
            InMemoryJobExecutionRepository::new(db.clone(), sequence.clone()),
            InMemoryStepExecutionRepository::new(db.clone(), sequence),
            InMemoryExecutionContextRepository::new(db),
        )
    }

    #[tokio::test]
    async fn instance_creation_is_unique_per_name_and_key() {
        let (instances, _, _, _) = repositories();
        let params = JobParameters::new().with_long("run", 1);

        let created = instances.create("import", &params).await.unwrap();
        assert_eq!(created.version, 0);

        let err = instances.create("import", &params).await.unwrap_err();
        assert!(matches!(err, BatchError::AlreadyExists { .. }));

        // Same parameters under a different name are a different identity.
        instances.create("export", &params).await.unwrap();
    }

    #[tokio::test]
    async fn stale_update_reports_both_versions() {
        let (instances, executions, _, _) = repositories();
        let instance = instances
            .create("import", &JobParameters::new())
            .await
            .unwrap();

        let mut execution = JobExecution::new(instance.id);
        executions.save(&mut execution).await.unwrap();
        assert_eq!(execution.version, Some(0));

        let mut winner = execution.clone();
        executions.update(&mut winner).await.unwrap();
        assert_eq!(winner.version, Some(1));

        let err = executions.update(&mut execution).await.unwrap_err();
        match err {
            BatchError::ConcurrentModification {
                submitted, current, ..
            } => {
                assert_eq!(submitted, 0);
                assert_eq!(current, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stale_step_update_reports_both_versions() {
        let (instances, executions, steps, _) = repositories();
        let instance = instances
            .create("import", &JobParameters::new())
            .await
            .unwrap();
        let mut execution = JobExecution::new(instance.id);
        executions.save(&mut execution).await.unwrap();

        let mut step = StepExecution::new("load", execution.id.unwrap());
        steps.save(&mut step).await.unwrap();

        let mut winner = step.clone();
        winner.read_count = 10;
        steps.update(&mut winner).await.unwrap();

        let mut loser = step.clone();
        loser.read_count = 99;
        let err = steps.update(&mut loser).await.unwrap_err();
        assert!(matches!(
            err,
            BatchError::ConcurrentModification {
                submitted: 0,
                current: 1,
                ..
            }
        ));

        // The winner's counters stay in place.
        let stored = steps
            .get(&execution, step.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.read_count, 10);
        assert_eq!(stored.version, Some(1));
    }

    #[tokio::test]
    async fn context_is_empty_until_saved_and_replaced_wholesale() {
        let (_, _, _, contexts) = repositories();
        let owner = ContextOwner::Job(7);

        assert!(contexts.get(owner).await.unwrap().is_empty());

        let mut first = ExecutionContext::new();
        first.put_long("offset", 10);
        first.put_string("reader", "page-1");
        contexts.save_or_update(owner, &first).await.unwrap();

        let mut second = ExecutionContext::new();
        second.put_long("offset", 20);
        contexts.save_or_update(owner, &second).await.unwrap();

        let loaded = contexts.get(owner).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get("reader").is_none());
    }
}
