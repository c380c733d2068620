use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A typed directed edge between two entity names.
///
/// Endpoints are not checked against stored entities, so a relation may
/// outlive the entities it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Source entity name
    pub from: String,
    /// Target entity name
    pub to: String,
    /// Edge label
    pub relation_type: String,
    /// Optional open-ended attributes of the edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// The identity of a relation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKey {
    pub from: String,
    pub relation_type: String,
    pub to: String,
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.relation_type, self.to)
    }
}

impl Relation {
    pub fn new(from: &str, to: &str, relation_type: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            relation_type: relation_type.to_string(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn key(&self) -> RelationKey {
        RelationKey {
            from: self.from.clone(),
            relation_type: self.relation_type.clone(),
            to: self.to.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.from.trim().is_empty() {
            return Err("relation source cannot be empty".to_string());
        }
        if self.to.trim().is_empty() {
            return Err("relation target cannot be empty".to_string());
        }
        if self.relation_type.trim().is_empty() {
            return Err("relation type cannot be empty".to_string());
        }
        Ok(())
    }

    /// The endpoint opposite to `name`, if the relation touches it
    pub fn other_end(&self, name: &str) -> Option<&str> {
        if self.from == name {
            Some(self.to.as_str())
        } else if self.to == name {
            Some(self.from.as_str())
        } else {
            None
        }
    }
}
