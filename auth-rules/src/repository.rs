use crate::{
    error::{AuthzError, Result},
    models::Record,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Storage collaborator consulted for relation hops
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Fetch a stored record, or [`AuthzError::RecordNotFound`]
    async fn fetch_record(&self, collection: &str, id: &str) -> Result<Record>;

    /// Ids referenced by `relation_field` of a stored record
    async fn fetch_related(
        &self,
        collection: &str,
        id: &str,
        relation_field: &str,
    ) -> Result<BTreeSet<String>> {
        let record = self.fetch_record(collection, id).await?;
        Ok(record.relation_ids(relation_field))
    }
}

/// In-memory record repository for testing and development
#[derive(Clone)]
pub struct InMemoryRecordRepository {
    records: Arc<DashMap<(String, String), Record>>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Load a `{ "<collection>": [records...] }` dataset
    ///
    /// # Errors
    ///
    /// Fails when any record lacks an id.
    pub fn from_dataset(dataset: HashMap<String, Vec<Record>>) -> Result<Self> {
        let repository = Self::new();
        for (collection, records) in dataset {
            for record in records {
                repository.insert(&collection, record)?;
            }
        }
        Ok(repository)
    }

    /// Store a record, replacing any previous version
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Validation`] when the record has no id.
    pub fn insert(&self, collection: &str, record: Record) -> Result<()> {
        let id = record
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AuthzError::Validation(format!("Cannot store a record without id in '{collection}'"))
            })?
            .to_string();
        self.records.insert((collection.to_string(), id), record);
        Ok(())
    }

    pub fn remove(&self, collection: &str, id: &str) -> Option<Record> {
        self.records
            .remove(&(collection.to_string(), id.to_string()))
            .map(|(_, record)| record)
    }

    /// Records of one collection, ordered by id
    pub fn list(&self, collection: &str) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id().cmp(&b.id()));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn fetch_record(&self, collection: &str, id: &str) -> Result<Record> {
        self.records
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AuthzError::record_not_found(collection, id))
    }

    async fn fetch_related(
        &self,
        collection: &str,
        id: &str,
        relation_field: &str,
    ) -> Result<BTreeSet<String>> {
        self.records
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.value().relation_ids(relation_field))
            .ok_or_else(|| AuthzError::record_not_found(collection, id))
    }
}
