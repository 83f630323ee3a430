//! Generic document-store capability
//!
//! A store holds named collections of JSON documents keyed by string. It
//! supports keyed upsert/delete, delete-by-filter, bulk insert, find with
//! equality and set-membership predicates, and distinct-value projection.
//! Array-valued fields match a value when any element equals it.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub type Document = Value;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to decode stored document: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single condition on one document field
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals the value (or, for arrays, contains it)
    Eq(&'static str, Value),
    /// Negation of `Eq`; missing fields match
    Ne(&'static str, Value),
    /// Field matches `Eq` for at least one of the values
    In(&'static str, Vec<Value>),
    /// At least one of the nested predicates holds
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Eq(field, value) => field_equals(document, field, value),
            Self::Ne(field, value) => !field_equals(document, field, value),
            Self::In(field, values) => values.iter().any(|v| field_equals(document, field, v)),
            Self::Any(predicates) => predicates.iter().any(|p| p.matches(document)),
        }
    }
}

/// Conjunction of predicates; the empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq(field, value.into()));
        self
    }

    pub fn not_equals(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Ne(field, value.into()));
        self
    }

    pub fn one_of<V: Into<Value>>(
        mut self,
        field: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.predicates.push(Predicate::In(field, values));
        self
    }

    pub fn any(mut self, predicates: Vec<Predicate>) -> Self {
        self.predicates.push(Predicate::Any(predicates));
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.predicates.iter().all(|p| p.matches(document))
    }
}

static NULL: Value = Value::Null;

/// Values a field contributes to equality matching: array elements, the
/// scalar itself, or `null` when absent
pub fn field_values<'a>(document: &'a Document, field: &str) -> Vec<&'a Value> {
    match document.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => vec![&NULL],
    }
}

fn field_equals(document: &Document, field: &str, value: &Value) -> bool {
    let actual = document.get(field).unwrap_or(&NULL);
    actual == value || matches!(actual, Value::Array(items) if items.contains(value))
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a secondary index on `field`; a no-op if it already exists
    async fn ensure_index(&self, collection: &str, field: &'static str) -> Result<(), StoreError>;

    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Document,
    ) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Returns whether a document was removed
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    /// Returns the number of removed documents
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError>;

    /// Insert or replace documents by key
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<(String, Document)>,
    ) -> Result<(), StoreError>;

    /// Matching documents in key order
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Distinct values of `field` over matching documents, arrays flattened,
    /// absent fields skipped
    async fn distinct(
        &self,
        collection: &str,
        field: &'static str,
        filter: &Filter,
    ) -> Result<Vec<Value>, StoreError>;

    /// Delete every document matching `filter`, then insert `documents`.
    ///
    /// The default runs the two halves separately: if the insert fails the
    /// deleted documents stay deleted and the caller must rerun the whole
    /// replacement. Stores with transactions should override this.
    async fn replace_where(
        &self,
        collection: &str,
        filter: &Filter,
        documents: Vec<(String, Document)>,
    ) -> Result<usize, StoreError> {
        let removed = self.delete_many(collection, filter).await?;
        self.insert_many(collection, documents).await?;
        Ok(removed)
    }

    /// Make previous writes durable
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Run a store operation under a request deadline
pub async fn within<T, F>(deadline: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "deadline of {}ms exceeded",
            deadline.as_millis()
        ))),
    }
}
