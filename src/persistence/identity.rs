//! Identity policy
//!
//! Decides, per document kind, whether the caller assigns a deterministic id
//! or leaves it to the store. Deterministic ids are what make a repeated
//! write of the same logical entity an overwrite instead of an append.

use std::fmt;

use crate::core::{
    AnomalyRecord, CategoryDefinition, DocumentId, Influencer, ModelDebugOutput,
    ModelSizeStats, ModelSnapshot, Quantiles,
};

/// Prefix of every per-job results collection.
pub const RESULTS_COLLECTION_PREFIX: &str = "anomalyresults-";

/// There is only ever one quantiles document per job.
pub const QUANTILES_ID: &str = "hierarchical";

/// Id of the document that always holds the most recent model size stats.
pub const MODEL_SIZE_STATS_LATEST_ID: &str = "modelSizeStats";

pub fn results_collection_name(job_id: &str) -> String {
    format!("{}{}", RESULTS_COLLECTION_PREFIX, job_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Bucket,
    Record,
    BucketInfluencer,
    Influencer,
    CategoryDefinition,
    Quantiles,
    ModelSnapshot,
    ModelSizeStats,
    ModelDebugOutput,
    PartitionNormalizedProb,
    BulkState,
}

impl DocumentKind {
    /// Document type label handed to the store.
    pub fn type_name(&self) -> &'static str {
        match self {
            DocumentKind::Bucket => "bucket",
            DocumentKind::Record => "record",
            DocumentKind::BucketInfluencer => "bucketInfluencer",
            DocumentKind::Influencer => "influencer",
            DocumentKind::CategoryDefinition => "categoryDefinition",
            DocumentKind::Quantiles => "quantiles",
            DocumentKind::ModelSnapshot => "modelSnapshot",
            DocumentKind::ModelSizeStats => "modelSizeStats",
            DocumentKind::ModelDebugOutput => "modelDebugOutput",
            DocumentKind::PartitionNormalizedProb => "partitionNormalizedProb",
            DocumentKind::BulkState => "bulkState",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIdentity {
    /// Caller-chosen id: writes with the same id overwrite each other
    Assigned(DocumentId),
    /// Opaque id generated by the store: every write appends
    StoreAssigned,
}

impl DocumentIdentity {
    pub fn from_option(id: Option<&str>) -> Self {
        match id {
            Some(id) => DocumentIdentity::Assigned(id.to_string()),
            None => DocumentIdentity::StoreAssigned,
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            DocumentIdentity::Assigned(id) => Some(id),
            DocumentIdentity::StoreAssigned => None,
        }
    }

    pub fn into_id(self) -> Option<DocumentId> {
        match self {
            DocumentIdentity::Assigned(id) => Some(id),
            DocumentIdentity::StoreAssigned => None,
        }
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentIdentity::Assigned(id) => write!(f, "with ID {}", id),
            DocumentIdentity::StoreAssigned => f.write_str("with auto-generated ID"),
        }
    }
}

/// Standalone bucket influencer id: the bucket id immediately followed by
/// the influencer field name. There is no delimiter, so distinct
/// (bucket, field) pairs can map to the same id.
pub fn bucket_influencer_id(bucket_id: &str, influencer_field_name: &str) -> DocumentId {
    format!("{}{}", bucket_id, influencer_field_name)
}

// Per-kind resolvers used when writing or rewriting at a known id. Each one
// is a plain function so it can be handed to the persister as the id policy
// of a single-document write. New buckets and their children never go
// through these: the store always assigns their ids.

pub fn record(record: &AnomalyRecord) -> DocumentIdentity {
    DocumentIdentity::from_option(record.id.as_deref())
}

pub fn influencer(influencer: &Influencer) -> DocumentIdentity {
    DocumentIdentity::from_option(influencer.id.as_deref())
}

pub fn category_definition(category: &CategoryDefinition) -> DocumentIdentity {
    DocumentIdentity::Assigned(category.category_id.to_string())
}

pub fn quantiles(_: &Quantiles) -> DocumentIdentity {
    DocumentIdentity::Assigned(QUANTILES_ID.to_string())
}

pub fn model_snapshot(snapshot: &ModelSnapshot) -> DocumentIdentity {
    DocumentIdentity::Assigned(snapshot.snapshot_id.clone())
}

/// History copy of a size stats sample: appended.
pub fn model_size_stats_history(_: &ModelSizeStats) -> DocumentIdentity {
    DocumentIdentity::StoreAssigned
}

/// Latest-value copy of a size stats sample: overwritten on every sample.
pub fn model_size_stats_latest(_: &ModelSizeStats) -> DocumentIdentity {
    DocumentIdentity::Assigned(MODEL_SIZE_STATS_LATEST_ID.to_string())
}

pub fn model_debug_output(_: &ModelDebugOutput) -> DocumentIdentity {
    DocumentIdentity::StoreAssigned
}
