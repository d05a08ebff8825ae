//! MongoDB execution context repository
//!
//! Job and step contexts share one collection; the owner id field name
//! distinguishes them. A write replaces the whole document, so keys removed
//! from the in-memory context disappear from the store too.

use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::{Collection, Database, IndexModel};
use tracing::debug;

use jobledger_core::{ContextOwner, ExecutionContext, Result};
use jobledger_ports::ExecutionContextRepository;

use super::{codec, collections, fields, store_err};

pub struct MongoExecutionContextRepository {
    collection: Collection<Document>,
}

impl MongoExecutionContextRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collections::EXECUTION_CONTEXTS),
        }
    }

    /// Create the single-field indexes backing both owner kinds.
    pub async fn ensure_indexes(&self) -> Result<()> {
        for key in [fields::JOB_EXECUTION_ID, fields::STEP_EXECUTION_ID] {
            self.collection
                .create_index(IndexModel::builder().keys(doc! { key: 1 }).build())
                .await
                .map_err(|e| store_err("failed to create execution context index", e))?;
        }
        Ok(())
    }

    fn owner_key(owner: ContextOwner) -> &'static str {
        match owner {
            ContextOwner::Job(_) => fields::JOB_EXECUTION_ID,
            ContextOwner::Step(_) => fields::STEP_EXECUTION_ID,
        }
    }
}

#[async_trait]
impl ExecutionContextRepository for MongoExecutionContextRepository {
    async fn get(&self, owner: ContextOwner) -> Result<ExecutionContext> {
        let key = Self::owner_key(owner);
        let found = self
            .collection
            .find_one(doc! { key: owner.id() })
            .await
            .map_err(|e| store_err("failed to query execution context", e))?;
        Ok(match found {
            Some(doc) => codec::decode(doc, key),
            None => ExecutionContext::new(),
        })
    }

    async fn save_or_update(&self, owner: ContextOwner, context: &ExecutionContext) -> Result<()> {
        let key = Self::owner_key(owner);
        let replacement = codec::encode(key, owner.id(), context);
        self.collection
            .replace_one(doc! { key: owner.id() }, replacement)
            .upsert(true)
            .await
            .map_err(|e| store_err("failed to persist execution context", e))?;
        debug!(owner_id = owner.id(), entries = context.len(), "stored execution context");
        Ok(())
    }
}
