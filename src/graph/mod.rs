pub mod document;
pub mod entity;
pub mod error;
pub mod relation;
pub mod search;
pub mod store;

pub use document::{Document, DocumentKind};
pub use entity::{Entity, EntityInput};
pub use error::{GraphError, GraphResult};
pub use relation::{Relation, RelationKey};
pub use search::{SearchHit, SearchParams, SearchResults, SortBy};
pub use store::{GraphStats, ItemOutcome, KnowledgeGraph, RelatedEntities};
