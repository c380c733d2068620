pub mod config;
pub mod external;
pub mod graph;
pub mod tools;
pub mod transfer;

pub use config::Config;
pub use external::{BackendError, DocumentBackend, ElasticBackend, ElasticConfig, MemoryBackend};
pub use graph::{
    Document, Entity, EntityInput, GraphError, GraphStats, KnowledgeGraph, Relation,
    RelatedEntities, SearchParams, SearchResults, SortBy,
};
pub use tools::{dispatch, ToolError, TOOL_NAMES};
pub use transfer::{export_to_file, import_from_file, ExportSummary, ImportReport};
