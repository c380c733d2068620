use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::external::{DocumentQuery, Filter, SortKey};
use crate::graph::document::{DocumentKind, TYPE_FIELD};
use crate::graph::entity::Entity;

pub const DEFAULT_LIMIT: usize = 10;

/// Ordering of search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Full-text score, best first
    #[default]
    Relevance,
    /// Most recently read first. `recent` is accepted as a synonym.
    #[serde(alias = "recent")]
    Recency,
    /// Important entities first, then by read count
    Importance,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" => Ok(SortBy::Relevance),
            "recency" | "recent" => Ok(SortBy::Recency),
            "importance" => Ok(SortBy::Importance),
            other => Err(format!(
                "unknown sort order `{}` (expected relevance, recency, recent or importance)",
                other
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortBy::Relevance => "relevance",
            SortBy::Recency => "recency",
            SortBy::Importance => "importance",
        };
        write!(f, "{}", s)
    }
}

/// Parameters of a ranked entity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    /// Query text; empty matches every entity
    pub query: String,
    /// Restrict to these entity types; `None` or empty means no restriction
    pub entity_types: Option<Vec<String>>,
    pub limit: usize,
    pub sort_by: SortBy,
    /// Collect highlighted fragments of matching names and observations
    pub highlight: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            entity_types: None,
            limit: DEFAULT_LIMIT,
            sort_by: SortBy::default(),
            highlight: false,
        }
    }
}

impl SearchParams {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("limit must be at least 1".to_string());
        }
        Ok(())
    }

    /// Build the backend query implementing the ranking rules
    pub(crate) fn to_query(&self) -> DocumentQuery {
        let mut filters = vec![Filter::term(TYPE_FIELD, DocumentKind::Entity.as_str())];
        if let Some(types) = self.entity_types.as_ref().filter(|t| !t.is_empty()) {
            filters.push(Filter::terms("entityType", types.iter().cloned()));
        }

        let text = self.query.trim();
        let tie_break = SortKey::asc("name.keyword");
        let sort = match self.sort_by {
            SortBy::Relevance => vec![SortKey::Score, tie_break],
            SortBy::Recency => vec![SortKey::desc("lastRead"), tie_break],
            SortBy::Importance => vec![
                SortKey::desc("isImportant"),
                SortKey::desc("readCount"),
                SortKey::Score,
                tie_break,
            ],
        };

        DocumentQuery {
            text: (!text.is_empty()).then(|| text.to_string()),
            text_fields: vec![("name".to_string(), 3.0), ("observations".to_string(), 1.0)],
            filters,
            sort,
            size: self.limit,
            highlight: self.highlight,
        }
    }
}

/// One ranked entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entity: Entity,
    /// Relevance signal reported by the backend
    pub score: Option<f64>,
    /// Field name to highlighted fragments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub highlights: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Number of matching entities, independent of the limit
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.hits.iter().map(|hit| &hit.entity)
    }

    pub fn names(&self) -> Vec<String> {
        self.entities().map(|e| e.name.clone()).collect()
    }
}
