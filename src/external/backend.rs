use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::external::error::BackendResult;

/// Exact-match restriction on a document field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value
    Term { field: String, value: Value },
    /// Field equals any of the values
    Terms { field: String, values: Vec<Value> },
    /// At least one of the nested filters matches
    Any(Vec<Filter>),
}

impl Filter {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Filter::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::Terms {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One level of a result ordering
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Full-text relevance, best first
    Score,
    /// Stored field value; documents missing the field sort last
    Field { field: String, order: SortOrder },
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        SortKey::Field {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortKey::Field {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Backend-neutral ranked query over the collection
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// Free text; `None` matches every document passing the filters
    pub text: Option<String>,
    /// Fields searched by `text`, with their boost
    pub text_fields: Vec<(String, f32)>,
    /// Every filter must match
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub size: usize,
    /// Return highlighted fragments of the text fields
    pub highlight: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
    pub highlights: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Number of matching documents, independent of `size`
    pub total: u64,
    pub hits: Vec<QueryHit>,
}

/// Persistence and text-search substrate for the knowledge graph.
///
/// A single logical collection holds every document. Implementations give
/// per-document atomicity for each call and never retry on their own.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Create the collection with the given mappings. Returns `false` when it already existed.
    async fn ensure_index(&self, mappings: &Value) -> BackendResult<bool>;

    /// Remove the collection and all its documents. Returns `false` when it did not exist.
    async fn drop_index(&self) -> BackendResult<bool>;

    /// Store `document` under `id`, replacing any previous version.
    async fn put_document(&self, id: &str, document: &Value) -> BackendResult<()>;

    /// Merge the fields of `partial` into the document at `id`. When `id`
    /// does not exist, `upsert` is stored instead; without an upsert nothing
    /// is written and `None` is returned. Returns the document as stored.
    async fn merge_document(
        &self,
        id: &str,
        partial: &Value,
        upsert: Option<Value>,
    ) -> BackendResult<Option<Value>>;

    async fn get_document(&self, id: &str) -> BackendResult<Option<Value>>;

    /// Fetch several documents in one request, skipping ids that do not exist.
    async fn get_documents(&self, ids: &[String]) -> BackendResult<Vec<Value>>;

    /// Atomically increment `counter` and set `timestamp` to `at`.
    /// Returns the updated document, or `None` when `id` does not exist.
    async fn touch_document(
        &self,
        id: &str,
        counter: &str,
        timestamp: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>>;

    /// Returns whether a document existed.
    async fn delete_document(&self, id: &str) -> BackendResult<bool>;

    async fn query(&self, query: &DocumentQuery) -> BackendResult<QueryResult>;

    /// Every document matching all `filters`, without any size cap.
    async fn scan(&self, filters: &[Filter]) -> BackendResult<Vec<Value>>;
}
