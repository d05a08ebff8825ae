//! Counter-document sequence generator
//!
//! One document per entity type in the `sequences` collection, advanced
//! with an atomic `$inc` that upserts the counter at 1 on first use. The
//! find-and-modify form returns the post-increment value in the same
//! atomic operation, so concurrent callers across processes never observe
//! the same id twice.

use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use tracing::debug;

use jobledger_core::{BatchError, Result};
use jobledger_ports::SequenceGenerator;

use super::{collections, get_i64, store_err};

pub struct MongoSequenceGenerator {
    collection: Collection<Document>,
}

impl MongoSequenceGenerator {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(collections::SEQUENCES),
        }
    }
}

#[async_trait]
impl SequenceGenerator for MongoSequenceGenerator {
    async fn next_id(&self, entity_name: &str) -> Result<i64> {
        let counter = self
            .collection
            .find_one_and_update(
                doc! { "name": entity_name },
                doc! { "$inc": { "value": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| store_err("failed to advance sequence counter", e))?
            .ok_or_else(|| {
                BatchError::store(format!("sequence counter '{entity_name}' missing after upsert"))
            })?;

        let id = get_i64(&counter, "value")?;
        debug!(entity = entity_name, id, "allocated id");
        Ok(id)
    }
}
