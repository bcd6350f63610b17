//! Result serializer: in-memory result objects to document bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::identity::DocumentKind;
use crate::core::{Bucket, BucketInfluencer, PersistenceError};

pub fn to_document<T: Serialize + ?Sized>(
    kind: DocumentKind,
    value: &T,
) -> Result<Value, PersistenceError> {
    serde_json::to_value(value).map_err(|e| PersistenceError::Serialization {
        kind: kind.type_name(),
        reason: e.to_string(),
    })
}

/// Standalone copy of a bucket influencer carrying the owning bucket's
/// timestamp and interim flag.
pub fn bucket_influencer_standalone(
    influencer: &BucketInfluencer,
    bucket_time: DateTime<Utc>,
    is_interim: bool,
) -> Result<Value, PersistenceError> {
    let mut standalone = influencer.clone();
    standalone.timestamp = Some(bucket_time);
    standalone.is_interim = is_interim;
    to_document(DocumentKind::BucketInfluencer, &standalone)
}

/// Per-partition max normalized probability summary of one bucket.
pub fn partition_normalized_probs(job_id: &str, bucket: &Bucket) -> Value {
    let probs: Vec<Value> = bucket
        .per_partition_max_probability
        .iter()
        .map(|(partition, probability)| {
            json!({
                "partitionFieldValue": partition,
                "maxNormalizedProbability": probability,
            })
        })
        .collect();

    json!({
        "timestamp": bucket.timestamp,
        "jobId": job_id,
        "partitionNormalizedProbs": probs,
    })
}
