//! Behavioral tests over the in-memory repositories.
//!
//! These exercise the store contract end to end: sequence allocation,
//! instance identity, the version discipline on executions and steps, and
//! context persistence.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use jobledger_adapters::memory::{
    InMemoryDatabase, InMemoryExecutionContextRepository, InMemoryJobExecutionRepository,
    InMemoryJobInstanceRepository, InMemorySequenceGenerator, InMemoryStepExecutionRepository,
};
use jobledger_core::{
    BatchError, BatchStatus, ContextOwner, ExecutionContext, ExitStatus, JobExecution,
    JobParameters, StepExecution,
};
use jobledger_ports::{
    entities, ExecutionContextRepository, JobExecutionRepository, JobInstanceRepository,
    SequenceGenerator, StepExecutionRepository,
};

struct Stores {
    sequence: Arc<dyn SequenceGenerator>,
    instances: InMemoryJobInstanceRepository,
    executions: InMemoryJobExecutionRepository,
    steps: InMemoryStepExecutionRepository,
    contexts: InMemoryExecutionContextRepository,
}

fn stores() -> Stores {
    let db = InMemoryDatabase::new();
    let sequence: Arc<dyn SequenceGenerator> = Arc::new(InMemorySequenceGenerator::new(db.clone()));
    Stores {
        sequence: sequence.clone(),
        instances: InMemoryJobInstanceRepository::new(db.clone(), sequence.clone()),
        executions: InMemoryJobExecutionRepository::new(db.clone(), sequence.clone()),
        steps: InMemoryStepExecutionRepository::new(db.clone(), sequence),
        contexts: InMemoryExecutionContextRepository::new(db),
    }
}

fn sample_parameters() -> JobParameters {
    JobParameters::new()
        .with_string("job.key", "jobKey")
        .with_long("long", 1)
        .with_date("date", DateTime::from_timestamp_millis(7).unwrap())
        .with_double("double", 7.7)
}

#[tokio::test]
async fn sequences_are_dense_and_independent_per_entity() {
    let stores = stores();
    for expected in 1..=100 {
        let id = stores.sequence.next_id(entities::JOB_INSTANCE).await.unwrap();
        assert_eq!(id, expected);
    }
    // A different entity name starts its own counter from 1.
    let id = stores.sequence.next_id(entities::JOB_EXECUTION).await.unwrap();
    assert_eq!(id, 1);
}

#[tokio::test]
async fn creating_the_same_identity_twice_fails() {
    let stores = stores();
    let params = sample_parameters();

    stores.instances.create("Job1", &params).await.unwrap();
    let err = stores.instances.create("Job1", &params).await.unwrap_err();
    match err {
        BatchError::AlreadyExists { job_name, job_key } => {
            assert_eq!(job_name, "Job1");
            assert_eq!(job_key, params.job_key());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn instance_lookup_by_name_and_parameters() {
    let stores = stores();
    let params = sample_parameters();
    let created = stores.instances.create("Job1", &params).await.unwrap();

    let found = stores
        .instances
        .get_by_name_and_parameters("Job1", &params)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, created);

    let with_extra = params.clone().with_long("attempt", 2);
    assert!(stores
        .instances
        .get_by_name_and_parameters("Job1", &with_extra)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn instances_page_newest_first_with_zero_indexed_start() {
    let stores = stores();
    for run in 0..5 {
        let params = JobParameters::new().with_long("run", run);
        stores.instances.create("pager", &params).await.unwrap();
    }

    let page = stores.instances.list_by_name("pager", 0, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page[0].id > page[1].id);

    let next = stores.instances.list_by_name("pager", 2, 2).await.unwrap();
    assert_eq!(next.len(), 2);
    assert!(next[0].id < page[1].id);

    let tail = stores.instances.list_by_name("pager", 4, 2).await.unwrap();
    assert_eq!(tail.len(), 1);
}

#[tokio::test]
async fn job_names_are_distinct_and_sorted() {
    let stores = stores();
    for name in ["zeta", "alpha", "alpha", "mid"] {
        let params = JobParameters::new().with_string("n", name.to_owned() + "-salt");
        // Duplicate identity for "alpha" is expected on the second round.
        let _ = stores.instances.create(name, &params).await;
    }
    let names = stores.instances.list_job_names().await.unwrap();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn full_execution_lifecycle_advances_version_per_update() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();

    let mut execution = JobExecution::new(instance.id);
    execution.start_time = Some(Utc::now());
    execution.status = BatchStatus::Started;
    stores.executions.save(&mut execution).await.unwrap();
    assert_eq!(execution.version, Some(0));
    assert!(execution.id.is_some());

    execution.status = BatchStatus::Completed;
    execution.exit_status = ExitStatus::completed();
    execution.end_time = Some(Utc::now());
    execution.last_updated = Some(Utc::now());
    stores.executions.update(&mut execution).await.unwrap();
    assert_eq!(execution.version, Some(1));

    let stored = stores
        .executions
        .find_by_id(execution.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BatchStatus::Completed);
    assert_eq!(stored.version, Some(1));

    // The instance has exactly this one execution, and it reads back
    // completed.
    let all = stores.executions.find_by_instance(&instance).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, BatchStatus::Completed);
    assert_eq!(all[0].version, Some(1));

    let owner = stores
        .instances
        .get_by_execution(execution.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner, instance);
}

#[tokio::test]
async fn stale_update_leaves_stored_record_untouched() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();

    let mut execution = JobExecution::new(instance.id);
    stores.executions.save(&mut execution).await.unwrap();

    let mut winner = execution.clone();
    winner.status = BatchStatus::Started;
    stores.executions.update(&mut winner).await.unwrap();

    let mut loser = execution.clone();
    loser.status = BatchStatus::Failed;
    let err = stores.executions.update(&mut loser).await.unwrap_err();
    assert!(matches!(
        err,
        BatchError::ConcurrentModification {
            submitted: 0,
            current: 1,
            ..
        }
    ));

    // The loser's write must not have landed.
    let stored = stores
        .executions
        .find_by_id(execution.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, BatchStatus::Started);
    assert_eq!(stored.version, Some(1));
    // The rejected update must not advance the in-memory version either.
    assert_eq!(loser.version, Some(0));
}

#[tokio::test]
async fn updating_a_never_saved_execution_is_not_found() {
    let stores = stores();
    let mut execution = JobExecution::new(1);
    execution.id = Some(424_242);
    execution.version = Some(0);

    let err = stores.executions.update(&mut execution).await.unwrap_err();
    assert!(matches!(err, BatchError::NotFound { id: 424_242, .. }));
}

#[tokio::test]
async fn latest_execution_is_picked_by_create_time() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();

    let base = Utc::now();
    let mut ids = Vec::new();
    for offset in 0..3 {
        let mut execution = JobExecution::new(instance.id);
        execution.create_time = base + Duration::milliseconds(offset);
        stores.executions.save(&mut execution).await.unwrap();
        ids.push(execution.id.unwrap());
    }

    let latest = stores
        .executions
        .find_latest_by_instance(&instance)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, Some(ids[2]));

    let all = stores.executions.find_by_instance(&instance).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].id > all[1].id && all[1].id > all[2].id);
}

#[tokio::test]
async fn running_executions_are_those_without_end_time() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();
    let other = stores
        .instances
        .create("Job2", &sample_parameters())
        .await
        .unwrap();

    let mut finished = JobExecution::new(instance.id);
    finished.end_time = Some(Utc::now());
    stores.executions.save(&mut finished).await.unwrap();

    let mut running = JobExecution::new(instance.id);
    stores.executions.save(&mut running).await.unwrap();

    let mut other_running = JobExecution::new(other.id);
    stores.executions.save(&mut other_running).await.unwrap();

    let found = stores.executions.find_running("Job1").await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains(&running));

    assert!(stores.executions.find_running("Job3").await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_pulls_newer_status_and_version_from_the_store() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();

    let mut execution = JobExecution::new(instance.id);
    stores.executions.save(&mut execution).await.unwrap();

    // Another holder of the same execution finishes it.
    let mut other = execution.clone();
    other.status = BatchStatus::Completed;
    stores.executions.update(&mut other).await.unwrap();

    stores.executions.reconcile_status(&mut execution).await.unwrap();
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.version, Some(1));
}

#[tokio::test]
async fn reconcile_persists_an_execution_never_seen_by_the_store() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();

    let mut execution = JobExecution::new(instance.id);
    stores.executions.reconcile_status(&mut execution).await.unwrap();

    let id = execution.id.unwrap();
    let stored = stores.executions.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.version, Some(0));
}

#[tokio::test]
async fn step_lifecycle_and_scoped_lookup() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();
    let mut execution = JobExecution::new(instance.id);
    stores.executions.save(&mut execution).await.unwrap();

    let mut step = StepExecution::new("load", execution.id.unwrap());
    stores.steps.save(&mut step).await.unwrap();
    assert_eq!(step.version, Some(0));

    step.read_count = 50;
    step.commit_count = 5;
    step.status = BatchStatus::Completed;
    stores.steps.update(&mut step).await.unwrap();
    assert_eq!(step.version, Some(1));

    let fetched = stores
        .steps
        .get(&execution, step.id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.read_count, 50);

    // Scoped lookup: the same step id under a different execution misses.
    let mut foreign = JobExecution::new(instance.id);
    stores.executions.save(&mut foreign).await.unwrap();
    assert!(stores
        .steps
        .get(&foreign, step.id.unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn load_all_into_replaces_steps_in_id_order() {
    let stores = stores();
    let instance = stores
        .instances
        .create("Job1", &sample_parameters())
        .await
        .unwrap();
    let mut execution = JobExecution::new(instance.id);
    stores.executions.save(&mut execution).await.unwrap();

    for name in ["extract", "transform", "load"] {
        let mut step = StepExecution::new(name, execution.id.unwrap());
        stores.steps.save(&mut step).await.unwrap();
    }
    execution.step_executions.push(StepExecution::new("stale", 0));

    stores.steps.load_all_into(&mut execution).await.unwrap();
    let names: Vec<&str> = execution
        .step_executions
        .iter()
        .map(|s| s.step_name.as_str())
        .collect();
    assert_eq!(names, vec!["extract", "transform", "load"]);
}

#[tokio::test]
async fn job_and_step_contexts_do_not_collide() {
    let stores = stores();

    let mut job_context = ExecutionContext::new();
    job_context.put_long("offset", 100);
    stores
        .contexts
        .save_or_update(ContextOwner::Job(1), &job_context)
        .await
        .unwrap();

    let mut step_context = ExecutionContext::new();
    step_context.put_string("reader", "page-3");
    stores
        .contexts
        .save_or_update(ContextOwner::Step(1), &step_context)
        .await
        .unwrap();

    assert_eq!(
        stores.contexts.get(ContextOwner::Job(1)).await.unwrap(),
        job_context
    );
    assert_eq!(
        stores.contexts.get(ContextOwner::Step(1)).await.unwrap(),
        step_context
    );
}
