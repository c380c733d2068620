//! In-process implementation of [`DocumentBackend`].
//!
//! Evaluates the same query model as the Elasticsearch client with a simple
//! term-frequency score, which is enough to exercise the graph store without
//! a running cluster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use crate::external::backend::{
    DocumentBackend, DocumentQuery, Filter, QueryHit, QueryResult, SortKey, SortOrder,
};
use crate::external::error::{BackendError, BackendResult};

#[derive(Default)]
struct Collection {
    exists: bool,
    documents: BTreeMap<String, Value>,
}

#[derive(Default)]
pub struct MemoryBackend {
    collection: RwLock<Collection>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents of every kind
    pub async fn len(&self) -> usize {
        self.collection.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Keyword sub-fields resolve to the stored field itself
fn field<'a>(document: &'a Value, name: &str) -> Option<&'a Value> {
    document.get(name.strip_suffix(".keyword").unwrap_or(name))
}

fn filter_matches(filter: &Filter, document: &Value) -> bool {
    match filter {
        Filter::Term { field: name, value } => field(document, name) == Some(value),
        Filter::Terms { field: name, values } => {
            field(document, name).map_or(false, |v| values.contains(v))
        }
        Filter::Any(filters) => filters.iter().any(|f| filter_matches(f, document)),
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_texts(value: Option<&Value>) -> Vec<&str> {
    match value {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn score(document: &Value, terms: &[String], fields: &[(String, f32)]) -> f64 {
    fields
        .iter()
        .map(|(name, boost)| {
            let matches = field_texts(field(document, name))
                .into_iter()
                .flat_map(tokenize)
                .filter(|token| terms.contains(token))
                .count();
            matches as f64 * f64::from(*boost)
        })
        .sum()
}

fn highlight_pattern(terms: &[String]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = terms.iter().map(|t| regex::escape(t)).collect();
    RegexBuilder::new(&format!(r"\b({})\b", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .ok()
}

fn highlights(
    document: &Value,
    pattern: &Regex,
    fields: &[(String, f32)],
) -> BTreeMap<String, Vec<String>> {
    fields
        .iter()
        .filter_map(|(name, _)| {
            let fragments: Vec<String> = field_texts(field(document, name))
                .into_iter()
                .filter(|text| pattern.is_match(text))
                .map(|text| pattern.replace_all(text, "<em>$1</em>").into_owned())
                .collect();
            (!fragments.is_empty()).then(|| (name.clone(), fragments))
        })
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => {
            // Timestamps carry a variable number of fractional digits
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => Ordering::Equal,
    }
}

fn compare_hits(a: &(f64, &Value), b: &(f64, &Value), sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = match key {
            SortKey::Score => b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal),
            SortKey::Field { field: name, order } => {
                match (field(a.1, name), field(b.1, name)) {
                    (Some(x), Some(y)) => {
                        let ordering = compare_values(x, y);
                        match order {
                            SortOrder::Asc => ordering,
                            SortOrder::Desc => ordering.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn ensure_index(&self, _mappings: &Value) -> BackendResult<bool> {
        let mut collection = self.collection.write().await;
        let created = !collection.exists;
        collection.exists = true;
        Ok(created)
    }

    async fn drop_index(&self) -> BackendResult<bool> {
        let mut collection = self.collection.write().await;
        let existed = collection.exists;
        *collection = Collection::default();
        Ok(existed)
    }

    async fn put_document(&self, id: &str, document: &Value) -> BackendResult<()> {
        if !document.is_object() {
            return Err(BackendError::RequestError {
                status: 400,
                reason: format!("document {} is not an object", id),
            });
        }
        let mut collection = self.collection.write().await;
        collection.documents.insert(id.to_string(), document.clone());
        Ok(())
    }

    async fn merge_document(
        &self,
        id: &str,
        partial: &Value,
        upsert: Option<Value>,
    ) -> BackendResult<Option<Value>> {
        let mut collection = self.collection.write().await;
        if let Some(existing) = collection.documents.get_mut(id) {
            let (Value::Object(existing), Some(fields)) = (existing, partial.as_object()) else {
                return Err(BackendError::RequestError {
                    status: 400,
                    reason: format!("cannot merge into document {}", id),
                });
            };
            for (key, value) in fields {
                existing.insert(key.clone(), value.clone());
            }
            return Ok(Some(Value::Object(existing.clone())));
        }

        if let Some(upsert) = &upsert {
            collection.documents.insert(id.to_string(), upsert.clone());
        }
        Ok(upsert)
    }

    async fn get_document(&self, id: &str) -> BackendResult<Option<Value>> {
        Ok(self.collection.read().await.documents.get(id).cloned())
    }

    async fn get_documents(&self, ids: &[String]) -> BackendResult<Vec<Value>> {
        let collection = self.collection.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| collection.documents.get(id).cloned())
            .collect())
    }

    async fn touch_document(
        &self,
        id: &str,
        counter: &str,
        timestamp: &str,
        at: DateTime<Utc>,
    ) -> BackendResult<Option<Value>> {
        let mut collection = self.collection.write().await;
        let Some(Value::Object(document)) = collection.documents.get_mut(id) else {
            return Ok(None);
        };

        let count = document.get(counter).and_then(Value::as_u64).unwrap_or(0);
        document.insert(counter.to_string(), json!(count + 1));
        document.insert(timestamp.to_string(), json!(at));
        Ok(Some(Value::Object(document.clone())))
    }

    async fn delete_document(&self, id: &str) -> BackendResult<bool> {
        Ok(self.collection.write().await.documents.remove(id).is_some())
    }

    async fn query(&self, query: &DocumentQuery) -> BackendResult<QueryResult> {
        let collection = self.collection.read().await;
        let terms: Vec<String> = {
            let mut seen = HashSet::new();
            tokenize(query.text.as_deref().unwrap_or_default())
                .into_iter()
                .filter(|t| seen.insert(t.clone()))
                .collect()
        };

        let mut matches: Vec<(&String, (f64, &Value))> = collection
            .documents
            .iter()
            .filter(|(_, doc)| query.filters.iter().all(|f| filter_matches(f, doc)))
            .filter_map(|(id, doc)| {
                if terms.is_empty() {
                    return Some((id, (1.0, doc)));
                }
                let score = score(doc, &terms, &query.text_fields);
                (score > 0.0).then_some((id, (score, doc)))
            })
            .collect();

        matches.sort_by(|a, b| compare_hits(&a.1, &b.1, &query.sort));

        let pattern = if query.highlight {
            highlight_pattern(&terms)
        } else {
            None
        };

        let total = matches.len() as u64;
        let hits = matches
            .into_iter()
            .take(query.size)
            .map(|(id, (score, doc))| QueryHit {
                id: id.clone(),
                score: Some(score),
                source: doc.clone(),
                highlights: pattern
                    .as_ref()
                    .map(|p| highlights(doc, p, &query.text_fields))
                    .unwrap_or_default(),
            })
            .collect();

        Ok(QueryResult { total, hits })
    }

    async fn scan(&self, filters: &[Filter]) -> BackendResult<Vec<Value>> {
        let collection = self.collection.read().await;
        Ok(collection
            .documents
            .values()
            .filter(|doc| filters.iter().all(|f| filter_matches(f, doc)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_query(text: &str) -> DocumentQuery {
        DocumentQuery {
            text: Some(text.to_string()),
            text_fields: vec![("name".to_string(), 3.0), ("observations".to_string(), 1.0)],
            filters: vec![Filter::term("type", "entity")],
            sort: vec![SortKey::Score, SortKey::asc("name.keyword")],
            size: 10,
            highlight: true,
        }
    }

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .put_document(
                "entity:rust",
                &json!({ "type": "entity", "name": "rust", "observations": ["systems language"] }),
            )
            .await
            .unwrap();
        backend
            .put_document(
                "entity:cargo",
                &json!({ "type": "entity", "name": "cargo", "observations": ["builds Rust crates", "rust tool"] }),
            )
            .await
            .unwrap();
        backend
            .put_document(
                "relation:rust",
                &json!({ "type": "relation", "from": "cargo", "to": "rust", "relationType": "builds" }),
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_name_matches_outrank_observations() {
        let backend = seeded().await;

        let result = backend.query(&text_query("rust")).await.unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.hits[0].id, "entity:rust");
        assert_eq!(result.hits[0].score, Some(3.0));
        assert_eq!(result.hits[1].score, Some(2.0));
    }

    #[tokio::test]
    async fn test_highlights_wrap_matching_terms() {
        let backend = seeded().await;

        let result = backend.query(&text_query("RUST")).await.unwrap();
        let cargo = &result.hits[1];

        assert_eq!(
            cargo.highlights["observations"],
            vec!["builds <em>Rust</em> crates", "<em>rust</em> tool"]
        );
        assert!(!cargo.highlights.contains_key("name"));
    }

    #[tokio::test]
    async fn test_timestamps_sort_chronologically() {
        let backend = MemoryBackend::new();
        backend
            .put_document("a", &json!({ "name": "a", "lastRead": "2024-05-01T10:00:00Z" }))
            .await
            .unwrap();
        backend
            .put_document("b", &json!({ "name": "b", "lastRead": "2024-05-01T10:00:00.500Z" }))
            .await
            .unwrap();
        backend.put_document("c", &json!({ "name": "c" })).await.unwrap();

        let query = DocumentQuery {
            text: None,
            text_fields: vec![],
            filters: vec![],
            sort: vec![SortKey::desc("lastRead")],
            size: 10,
            highlight: false,
        };
        let result = backend.query(&query).await.unwrap();
        let ids: Vec<_> = result.hits.iter().map(|h| h.id.as_str()).collect();

        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_merge_keeps_unmentioned_fields() {
        let backend = MemoryBackend::new();
        let upsert = json!({ "name": "x", "entityType": "thing", "readCount": 4 });

        let missing = backend
            .merge_document("x", &json!({ "name": "x" }), None)
            .await
            .unwrap();
        assert!(missing.is_none());
        assert!(backend.is_empty().await);

        let created = backend
            .merge_document("x", &json!({ "name": "x" }), Some(upsert.clone()))
            .await
            .unwrap();
        assert_eq!(created, Some(upsert));

        let merged = backend
            .merge_document("x", &json!({ "entityType": "other" }), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged["entityType"], "other");
        assert_eq!(merged["readCount"], 4);
    }

    #[tokio::test]
    async fn test_scan_applies_any_filter() {
        let backend = seeded().await;

        let found = backend
            .scan(&[
                Filter::term("type", "relation"),
                Filter::Any(vec![
                    Filter::terms("from", ["rust"]),
                    Filter::terms("to", ["rust"]),
                ]),
            ])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["from"], "cargo");
    }
}
