pub mod backend;
pub mod elastic;
pub mod error;
mod memory;

pub use backend::{DocumentBackend, DocumentQuery, Filter, QueryHit, QueryResult, SortKey, SortOrder};
pub use elastic::{ElasticBackend, ElasticConfig};
pub use error::{BackendError, BackendResult};
pub use memory::MemoryBackend;
