//! MongoDB job instance repository

use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Collection, Database, IndexModel};
use tracing::{debug, warn};

use jobledger_core::{BatchError, JobInstance, JobParameter, JobParameters, Result};
use jobledger_ports::{entities, JobInstanceRepository, SequenceGenerator};

use super::{collections, fields, get_i64, get_string, store_err, to_bson_datetime};

pub struct MongoJobInstanceRepository {
    collection: Collection<Document>,
    executions: Collection<Document>,
    sequence: Arc<dyn SequenceGenerator>,
}

impl MongoJobInstanceRepository {
    pub fn new(db: &Database, sequence: Arc<dyn SequenceGenerator>) -> Self {
        Self {
            collection: db.collection(collections::JOB_INSTANCES),
            executions: db.collection(collections::JOB_EXECUTIONS),
            sequence,
        }
    }

    /// Create the single-field index backing id lookups.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { fields::JOB_INSTANCE_ID: 1 })
                    .build(),
            )
            .await
            .map_err(|e| store_err("failed to create job instance index", e))?;
        Ok(())
    }

    fn to_document(instance: &JobInstance) -> Document {
        doc! {
            fields::JOB_INSTANCE_ID: instance.id,
            fields::JOB_NAME: instance.job_name.as_str(),
            fields::JOB_KEY: instance.job_key.as_str(),
            fields::VERSION: instance.version,
            fields::JOB_PARAMETERS: encode_parameters(&instance.parameters),
        }
    }

    fn map_instance(doc: &Document) -> Result<JobInstance> {
        let parameters = match doc.get(fields::JOB_PARAMETERS) {
            Some(Bson::Document(params)) => decode_parameters(params),
            _ => JobParameters::new(),
        };
        Ok(JobInstance {
            id: get_i64(doc, fields::JOB_INSTANCE_ID)?,
            job_name: get_string(doc, fields::JOB_NAME)?,
            job_key: get_string(doc, fields::JOB_KEY)?,
            parameters,
            version: 0,
        })
    }
}

fn encode_parameters(parameters: &JobParameters) -> Document {
    let mut doc = Document::new();
    for (key, value) in parameters.iter() {
        let encoded = match value {
            JobParameter::String(s) => Bson::String(s.clone()),
            JobParameter::Long(v) => Bson::Int64(*v),
            JobParameter::Double(v) => Bson::Double(*v),
            JobParameter::Date(d) => to_bson_datetime(*d),
        };
        doc.insert(key, encoded);
    }
    doc
}

fn decode_parameters(doc: &Document) -> JobParameters {
    let mut parameters = JobParameters::new();
    for (key, value) in doc.iter() {
        let decoded = match value {
            Bson::String(s) => JobParameter::String(s.clone()),
            Bson::Int64(v) => JobParameter::Long(*v),
            Bson::Int32(v) => JobParameter::Long(i64::from(*v)),
            Bson::Double(v) => JobParameter::Double(*v),
            Bson::DateTime(dt) => JobParameter::Date(super::from_bson_datetime(*dt)),
            other => {
                warn!(key = %key, kind = ?other.element_type(), "skipping job parameter of unsupported type");
                continue;
            }
        };
        parameters.insert(key.clone(), decoded);
    }
    parameters
}

#[async_trait]
impl JobInstanceRepository for MongoJobInstanceRepository {
    async fn create(&self, job_name: &str, parameters: &JobParameters) -> Result<JobInstance> {
        if let Some(existing) = self
            .get_by_name_and_parameters(job_name, parameters)
            .await?
        {
            return Err(BatchError::AlreadyExists {
                job_name: job_name.to_string(),
                job_key: existing.job_key,
            });
        }

        let id = self.sequence.next_id(entities::JOB_INSTANCE).await?;
        let instance = JobInstance::new(id, job_name, parameters.clone());
        self.collection
            .insert_one(Self::to_document(&instance))
            .await
            .map_err(|e| store_err("failed to insert job instance", e))?;
        debug!(id, job = job_name, "created job instance");
        Ok(instance)
    }

    async fn get_by_name_and_parameters(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> Result<Option<JobInstance>> {
        let job_key = parameters.job_key();
        let found = self
            .collection
            .find_one(doc! { fields::JOB_NAME: job_name, fields::JOB_KEY: job_key })
            .await
            .map_err(|e| store_err("failed to query job instance by name and key", e))?;
        found.as_ref().map(Self::map_instance).transpose()
    }

    async fn get_by_id(&self, instance_id: i64) -> Result<Option<JobInstance>> {
        let found = self
            .collection
            .find_one(doc! { fields::JOB_INSTANCE_ID: instance_id })
            .await
            .map_err(|e| store_err("failed to query job instance by id", e))?;
        found.as_ref().map(Self::map_instance).transpose()
    }

    async fn get_by_execution(&self, job_execution_id: i64) -> Result<Option<JobInstance>> {
        let execution = self
            .executions
            .find_one(doc! { fields::JOB_EXECUTION_ID: job_execution_id })
            .projection(doc! { fields::JOB_INSTANCE_ID: 1 })
            .await
            .map_err(|e| store_err("failed to resolve owning job execution", e))?;

        match execution {
            Some(doc) => self.get_by_id(get_i64(&doc, fields::JOB_INSTANCE_ID)?).await,
            None => Ok(None),
        }
    }

    async fn list_by_name(
        &self,
        job_name: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<JobInstance>> {
        let mut cursor = self
            .collection
            .find(doc! { fields::JOB_NAME: job_name })
            .sort(doc! { fields::JOB_INSTANCE_ID: -1 })
            .skip(start as u64)
            .limit(count as i64)
            .await
            .map_err(|e| store_err("failed to list job instances", e))?;

        let mut instances = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| store_err("failed to iterate job instances", e))?
        {
            instances.push(Self::map_instance(&doc)?);
        }
        Ok(instances)
    }

    async fn list_job_names(&self) -> Result<Vec<String>> {
        let values = self
            .collection
            .distinct(fields::JOB_NAME, doc! {})
            .await
            .map_err(|e| store_err("failed to list distinct job names", e))?;

        let mut names: Vec<String> = values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(name) => Some(name),
                _ => None,
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
