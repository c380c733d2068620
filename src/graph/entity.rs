use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, typed node of the knowledge graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique name, the primary key
    pub name: String,
    /// Free-form category label
    pub entity_type: String,
    /// Free-text facts, in insertion order
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub is_important: bool,
    #[serde(default = "Utc::now")]
    pub last_read: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_write: DateTime<Utc>,
    /// Number of direct lookups
    #[serde(default)]
    pub read_count: u64,
}

impl Entity {
    /// Create a new entity as it is first written at `now`
    pub fn new(name: &str, entity_type: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            observations: Vec::new(),
            is_important: false,
            last_read: now,
            last_write: now,
            read_count: 0,
        }
    }
}

/// Write request for an entity.
///
/// Fields left as `None` keep their stored value on update and take their
/// default when the entity is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_important: Option<bool>,
}

impl EntityInput {
    pub fn new(name: &str, entity_type: &str) -> Self {
        Self {
            name: name.to_string(),
            entity_type: Some(entity_type.to_string()),
            ..Default::default()
        }
    }

    /// Input touching only the given name; every other field is kept
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observations = Some(observations.into_iter().map(Into::into).collect());
        self
    }

    pub fn important(mut self, is_important: bool) -> Self {
        self.is_important = Some(is_important);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("entity name cannot be empty".to_string());
        }
        if matches!(&self.entity_type, Some(t) if t.trim().is_empty()) {
            return Err("entityType cannot be empty".to_string());
        }
        Ok(())
    }

    /// The entity this input creates when no entity of that name exists yet
    pub fn create(&self, now: DateTime<Utc>) -> Option<Entity> {
        let mut entity = Entity::new(&self.name, self.entity_type.as_deref()?, now);
        if let Some(observations) = &self.observations {
            entity.observations = observations.clone();
        }
        entity.is_important = self.is_important.unwrap_or(false);
        Some(entity)
    }
}
