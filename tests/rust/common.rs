//! Common utilities for integration tests

use chrono::{TimeZone, Utc};
use std::sync::{Arc, Once};

use anomaly_results::storage::backends::StoreCall;
use anomaly_results::{
    AnomalyRecord, Bucket, BucketInfluencer, Influencer, MemoryDocumentStore, Quantiles,
    ResultsPersister,
};

static INIT: Once = Once::new();

pub const JOB_ID: &str = "it-job";

/// Initialize test environment
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Persister over a fresh in-memory store, plus the store for inspection
pub fn memory_persister() -> (Arc<MemoryDocumentStore>, ResultsPersister) {
    init_test_env();
    let store = Arc::new(MemoryDocumentStore::new());
    let persister = ResultsPersister::new(store.clone());
    (store, persister)
}

pub fn results_collection() -> String {
    anomaly_results::persistence::results_collection_name(JOB_ID)
}

/// Bucket with the given record probabilities and bucket influencer fields
pub fn create_test_bucket(epoch: i64, probabilities: &[f64], influencer_fields: &[&str]) -> Bucket {
    let mut bucket = Bucket::new(
        JOB_ID,
        Utc.timestamp_opt(epoch, 0).single().expect("valid epoch"),
    );
    bucket.bucket_span = 3600;
    bucket.anomaly_score = 42.0;
    bucket.record_count = probabilities.len() as u32;
    bucket.records = Some(
        probabilities
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut record = AnomalyRecord::new(JOB_ID, *p);
                record.detector_index = i as u32;
                record.function = Some("mean".to_string());
                record
            })
            .collect(),
    );
    bucket.bucket_influencers = influencer_fields
        .iter()
        .map(|field| BucketInfluencer::new(JOB_ID, *field))
        .collect();
    bucket
}

pub fn create_test_influencer(field: &str, value: &str) -> Influencer {
    let mut influencer = Influencer::new(JOB_ID, field, value);
    influencer.anomaly_score = 12.5;
    influencer
}

pub fn create_test_quantiles(state: &str) -> Quantiles {
    Quantiles {
        job_id: JOB_ID.to_string(),
        timestamp: Some(Utc::now()),
        quantile_state: state.to_string(),
    }
}

/// Document kinds touched by each write call, in call order
pub fn written_kinds(calls: &[StoreCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            StoreCall::Upsert { kind, .. } => Some(kind.clone()),
            StoreCall::BulkUpsert { items, .. } => items.first().map(|item| item.kind.clone()),
            _ => None,
        })
        .collect()
}
