//! Persistence building blocks: id policy, serialization, batching and the
//! outcome type every write reports through.

pub mod batch_writer;
pub mod identity;
pub mod outcome;
pub mod serializer;

pub use batch_writer::{BatchResult, BatchWriter};
pub use identity::{
    results_collection_name, DocumentIdentity, DocumentKind, MODEL_SIZE_STATS_LATEST_ID,
    QUANTILES_ID, RESULTS_COLLECTION_PREFIX,
};
pub use outcome::{PersistWarning, WriteOutcome};
