pub mod backends;
pub mod bulk_format;
pub mod traits;

pub use backends::{open_store, FilestoreDocumentStore, MemoryDocumentStore};
pub use traits::{BulkItem, BulkItemOutcome, BulkResponse, DocumentFilter, DocumentStore};
