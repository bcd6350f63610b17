//! Result data model of an anomaly detection job.
//!
//! These are the in-memory objects produced by the analytics process. Field
//! names are serialized in camelCase; identifiers are never part of the
//! document body because they travel as the document id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JobId = String;
pub type DocumentId = String;

/// One fixed-width time window of analysis output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub job_id: JobId,
    /// Store-assigned on first persist, reused on every update
    #[serde(default, skip_serializing)]
    pub id: Option<DocumentId>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub bucket_span: u64,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default)]
    pub initial_anomaly_score: f64,
    #[serde(default)]
    pub max_normalized_probability: f64,
    #[serde(default)]
    pub record_count: u32,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default)]
    pub is_interim: bool,
    /// `None` and `Some(vec![])` are different: a bucket without a record
    /// collection is not persisted at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<AnomalyRecord>>,
    #[serde(default)]
    pub bucket_influencers: Vec<BucketInfluencer>,
    #[serde(default)]
    pub influencers: Vec<Influencer>,
    #[serde(default)]
    pub partition_scores: Vec<PartitionScore>,
    #[serde(default, skip_serializing)]
    pub per_partition_max_probability: BTreeMap<String, f64>,
    #[serde(default)]
    pub processing_time_ms: u64,
}

impl Bucket {
    pub fn new(job_id: impl Into<JobId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            id: None,
            timestamp,
            bucket_span: 0,
            anomaly_score: 0.0,
            initial_anomaly_score: 0.0,
            max_normalized_probability: 0.0,
            record_count: 0,
            event_count: 0,
            is_interim: false,
            records: None,
            bucket_influencers: Vec::new(),
            influencers: Vec::new(),
            partition_scores: Vec::new(),
            per_partition_max_probability: BTreeMap::new(),
            processing_time_ms: 0,
        }
    }

    /// Seconds since the Unix epoch of the bucket start.
    pub fn epoch(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

/// One detector's anomalous output inside a bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub job_id: JobId,
    #[serde(default, skip_serializing)]
    pub id: Option<DocumentId>,
    #[serde(default)]
    pub detector_index: u32,
    pub probability: f64,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default)]
    pub normalized_probability: f64,
    #[serde(default)]
    pub initial_normalized_probability: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actual: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub typical: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_field_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_field_value: Option<String>,
    /// Inherited from the owning bucket at persist time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_interim: bool,
}

impl AnomalyRecord {
    pub fn new(job_id: impl Into<JobId>, probability: f64) -> Self {
        Self {
            job_id: job_id.into(),
            id: None,
            detector_index: 0,
            probability,
            anomaly_score: 0.0,
            normalized_probability: 0.0,
            initial_normalized_probability: 0.0,
            actual: Vec::new(),
            typical: Vec::new(),
            function: None,
            field_name: None,
            partition_field_name: None,
            partition_field_value: None,
            by_field_name: None,
            by_field_value: None,
            timestamp: None,
            is_interim: false,
        }
    }
}

/// A field found to explain a bucket's anomaly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfluencer {
    pub job_id: JobId,
    pub influencer_field_name: String,
    #[serde(default)]
    pub initial_anomaly_score: f64,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default)]
    pub raw_anomaly_score: f64,
    #[serde(default)]
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_interim: bool,
}

impl BucketInfluencer {
    pub fn new(job_id: impl Into<JobId>, influencer_field_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            influencer_field_name: influencer_field_name.into(),
            initial_anomaly_score: 0.0,
            anomaly_score: 0.0,
            raw_anomaly_score: 0.0,
            probability: 0.0,
            timestamp: None,
            is_interim: false,
        }
    }
}

/// A field value found to be unusually influential at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Influencer {
    pub job_id: JobId,
    #[serde(default, skip_serializing)]
    pub id: Option<DocumentId>,
    pub influencer_field_name: String,
    pub influencer_field_value: String,
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub initial_anomaly_score: f64,
    #[serde(default)]
    pub anomaly_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_interim: bool,
}

impl Influencer {
    pub fn new(
        job_id: impl Into<JobId>,
        field_name: impl Into<String>,
        field_value: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            id: None,
            influencer_field_name: field_name.into(),
            influencer_field_value: field_value.into(),
            probability: 0.0,
            initial_anomaly_score: 0.0,
            anomaly_score: 0.0,
            timestamp: None,
            is_interim: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionScore {
    pub partition_field_name: String,
    pub partition_field_value: String,
    pub anomaly_score: f64,
    pub probability: f64,
}

/// A learned message category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDefinition {
    pub job_id: JobId,
    pub category_id: u64,
    #[serde(default)]
    pub terms: String,
    #[serde(default)]
    pub regex: String,
    #[serde(default)]
    pub max_matching_length: u64,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Normalization state of the job's models. Opaque to this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quantiles {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub quantile_state: String,
}

/// Description of a saved model checkpoint. The model state itself is
/// persisted separately through the raw bulk path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    pub job_id: JobId,
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub restore_priority: u64,
    #[serde(default)]
    pub snapshot_doc_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_record_time_stamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_result_time_stamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    #[default]
    Ok,
    SoftLimit,
    HardLimit,
}

/// A memory usage sample of the job's models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSizeStats {
    pub job_id: JobId,
    pub model_bytes: u64,
    #[serde(default)]
    pub total_by_field_count: u64,
    #[serde(default)]
    pub total_over_field_count: u64,
    #[serde(default)]
    pub total_partition_field_count: u64,
    #[serde(default)]
    pub bucket_allocation_failures_count: u64,
    #[serde(default)]
    pub memory_status: MemoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_time: Option<DateTime<Utc>>,
}

/// Debug/trace output of the models. Carries arbitrary extra fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelDebugOutput {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_field_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_field_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_feature: Option<String>,
    #[serde(default)]
    pub debug_lower: f64,
    #[serde(default)]
    pub debug_upper: f64,
    #[serde(default)]
    pub debug_median: f64,
    #[serde(default)]
    pub actual: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
