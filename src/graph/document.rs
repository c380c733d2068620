use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::graph::{entity::Entity, relation::Relation};

/// Field holding the document kind discriminator
pub const TYPE_FIELD: &str = "type";

/// A record of the single graph collection, tagged by its `type` field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Document {
    Entity(Entity),
    Relation(Relation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Entity,
    Relation,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Entity => "entity",
            DocumentKind::Relation => "relation",
        }
    }
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Entity(_) => DocumentKind::Entity,
            Document::Relation(_) => DocumentKind::Relation,
        }
    }

    /// Storage id; entity and relation ids never collide
    pub fn id(&self) -> String {
        match self {
            Document::Entity(entity) => entity_id(&entity.name),
            Document::Relation(relation) => {
                relation_id(&relation.from, &relation.relation_type, &relation.to)
            }
        }
    }

    /// Human readable name of the record, used in error reports
    pub fn label(&self) -> String {
        match self {
            Document::Entity(entity) => entity.name.clone(),
            Document::Relation(relation) => relation.key().to_string(),
        }
    }
}

pub fn entity_id(name: &str) -> String {
    format!("entity:{}", name)
}

/// Relation ids embed the triple as a JSON array so that names containing
/// separators cannot alias another relation.
pub fn relation_id(from: &str, relation_type: &str, to: &str) -> String {
    format!("relation:{}", json!([from, relation_type, to]))
}

/// Index mappings for the graph collection
pub fn index_mappings() -> Value {
    json!({
        "properties": {
            "type": { "type": "keyword" },
            "name": {
                "type": "text",
                "fields": { "keyword": { "type": "keyword" } }
            },
            "entityType": { "type": "keyword" },
            "observations": { "type": "text" },
            "isImportant": { "type": "boolean" },
            "lastRead": { "type": "date" },
            "lastWrite": { "type": "date" },
            "readCount": { "type": "integer" },
            "from": { "type": "keyword" },
            "to": { "type": "keyword" },
            "relationType": { "type": "keyword" },
            "metadata": { "type": "object", "enabled": false }
        }
    })
}
