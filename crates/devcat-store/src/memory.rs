//! In-memory document store with secondary indexes and JSON snapshots
//!
//! Collections are kept in key order. Secondary indexes map the JSON text of
//! a field value to the keys of documents holding it; array fields index each
//! element, which gives set-membership lookups over ancestor/descendant lists.
//! When opened with a snapshot path, every flush rewrites the snapshot file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::store::{field_values, Document, DocumentStore, Filter, Predicate, StoreError};

/// Snapshot file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "default_version")]
    version: String,
    /// When this snapshot was written (RFC 3339)
    #[serde(default)]
    saved_at: String,
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, Document>>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<String, Document>,
    /// field -> value text -> document keys
    indexes: HashMap<&'static str, HashMap<String, BTreeSet<String>>>,
}

fn index_key(value: &Value) -> String {
    value.to_string()
}

impl Collection {
    fn insert(&mut self, key: String, document: Document) {
        self.remove(&key);
        for (field, index) in self.indexes.iter_mut() {
            for value in field_values(&document, field) {
                index.entry(index_key(value)).or_default().insert(key.clone());
            }
        }
        self.documents.insert(key, document);
    }

    fn remove(&mut self, key: &str) -> Option<Document> {
        let document = self.documents.remove(key)?;
        for (field, index) in self.indexes.iter_mut() {
            for value in field_values(&document, field) {
                let value_key = index_key(value);
                if let Some(keys) = index.get_mut(&value_key) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(&value_key);
                    }
                }
            }
        }
        Some(document)
    }

    fn build_index(&mut self, field: &'static str) {
        if self.indexes.contains_key(field) {
            return;
        }
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (key, document) in &self.documents {
            for value in field_values(document, field) {
                index.entry(index_key(value)).or_default().insert(key.clone());
            }
        }
        self.indexes.insert(field, index);
    }

    /// Keys narrowed by the first indexed `Eq`/`In` predicate, if any
    fn candidate_keys(&self, filter: &Filter) -> Option<BTreeSet<&String>> {
        for predicate in filter.predicates() {
            let (field, values) = match predicate {
                Predicate::Eq(field, value) => (*field, std::slice::from_ref(value)),
                Predicate::In(field, values) => (*field, values.as_slice()),
                _ => continue,
            };
            if let Some(index) = self.indexes.get(field) {
                let keys = values
                    .iter()
                    .filter_map(|v| index.get(&index_key(v)))
                    .flatten()
                    .collect();
                return Some(keys);
            }
        }
        None
    }

    fn matching<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> Box<dyn Iterator<Item = (&'a String, &'a Document)> + 'a> {
        match self.candidate_keys(filter) {
            Some(keys) => Box::new(
                keys.into_iter()
                    .filter_map(move |k| self.documents.get_key_value(k))
                    .filter(move |(_, d)| filter.matches(d)),
            ),
            None => Box::new(self.documents.iter().filter(move |(_, d)| filter.matches(d))),
        }
    }
}

/// Document store living in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    snapshot_path: Option<PathBuf>,
    /// Held from snapshot capture until the file is in place, so snapshots
    /// reach disk in the order they were taken
    save_lock: Mutex<()>,
}

impl MemoryStore {
    /// Create a new empty store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a snapshot file, loading it if it exists
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let snapshot = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str::<Snapshot>(&content).map_err(StoreError::Decode)?
        } else {
            Snapshot::default()
        };

        let mut collections = HashMap::new();
        let mut total = 0;
        for (name, documents) in snapshot.collections {
            total += documents.len();
            collections.insert(
                name,
                Collection {
                    documents,
                    indexes: HashMap::new(),
                },
            );
        }
        info!(path = %path.display(), documents = total, "Opened document store");

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    /// Write all collections to a snapshot file.
    ///
    /// The snapshot goes to a sibling temporary file first and is renamed
    /// over `path`, so a crash never leaves a partial snapshot behind.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let _saving = self.save_lock.lock().await;
        let snapshot = {
            let collections = self.collections.read().await;
            Snapshot {
                version: default_version(),
                saved_at: chrono::Utc::now().to_rfc3339(),
                collections: collections
                    .iter()
                    .map(|(name, c)| (name.clone(), c.documents.clone()))
                    .collect(),
            }
        };
        let content = serde_json::to_string_pretty(&snapshot).map_err(StoreError::Encode)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(path);
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, path).await?;
        debug!(path = %path.display(), "Saved store snapshot");
        Ok(())
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_index(&self, collection: &str, field: &'static str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .build_index(field);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.documents.get(key))
            .cloned())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .and_then(|c| c.remove(key))
            .is_some())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|c| delete_matching(c, filter))
            .unwrap_or(0))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<(String, Document)>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();
        for (key, document) in documents {
            target.insert(key, document);
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = target.matching(filter).map(|(_, d)| d.clone());
        Ok(match limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &'static str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for (_, document) in target.matching(filter) {
            if document.get(field).is_none() {
                continue;
            }
            for value in field_values(document, field) {
                if seen.insert(index_key(value)) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    /// Delete and insert under a single write lock, so readers never see
    /// the intermediate state
    async fn replace_where(
        &self,
        collection: &str,
        filter: &Filter,
        documents: Vec<(String, Document)>,
    ) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();
        let removed = delete_matching(target, filter);
        for (key, document) in documents {
            target.insert(key, document);
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        match &self.snapshot_path {
            Some(path) => self.save(path).await,
            None => Ok(()),
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn delete_matching(collection: &mut Collection, filter: &Filter) -> usize {
    let keys: Vec<String> = collection
        .matching(filter)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &keys {
        collection.remove(key);
    }
    keys.len()
}
