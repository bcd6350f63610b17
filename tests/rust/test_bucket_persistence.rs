//! Bucket persistence: decomposition, parent linkage and fault isolation

use anomaly_results::storage::backends::StoreCall;
use anomaly_results::{DocumentKind, DocumentStore};

use crate::common::*;

#[tokio::test]
async fn test_null_record_collection_makes_zero_calls() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_000_000, &[], &["host"]);
    bucket.records = None;

    let outcome = persister.persist_bucket(JOB_ID, &mut bucket).await;

    assert_eq!(store.call_count(), 0);
    assert_eq!(outcome.documents_written, 0);
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn test_every_record_carries_its_bucket_as_parent() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_000_000, &[0.01, 0.2, 0.3], &[]);

    persister.persist_bucket(JOB_ID, &mut bucket).await;
    let bucket_id = bucket.id.clone().expect("bucket id");

    let records = store.realtime_documents(&results_collection(), "record").await;
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.parent.as_deref(), Some(bucket_id.as_str()));
        assert_eq!(record.body["timestamp"], serde_json::to_value(bucket.timestamp).unwrap());
    }

    let batches: Vec<_> = store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::BulkUpsert { .. }))
        .collect();
    assert_eq!(batches.len(), 1, "all records go in a single round trip");
}

#[tokio::test]
async fn test_influencer_batch_failure_still_writes_records_and_summary() {
    let (store, persister) = memory_persister();
    store.fail_bulk_of_kind("bucketInfluencer");
    let mut bucket = create_test_bucket(1_500_000_000, &[0.01, 0.2], &["host", "user"]);
    bucket
        .per_partition_max_probability
        .insert("us-east".to_string(), 0.7);

    let outcome = persister.persist_bucket(JOB_ID, &mut bucket).await;

    assert_eq!(outcome.documents_failed, 2);
    assert_eq!(outcome.warnings_for(DocumentKind::BucketInfluencer).count(), 1);
    let kinds = written_kinds(&store.calls());
    assert_eq!(
        kinds,
        vec!["bucket", "bucketInfluencer", "record", "partitionNormalizedProb"]
    );
    assert_eq!(
        store.realtime_documents(&results_collection(), "record").await.len(),
        2
    );
}

#[tokio::test]
async fn test_rejected_records_do_not_abort_the_batch() {
    let (store, persister) = memory_persister();
    store.reject_bulk_items_where(|item| item.body["detectorIndex"] == 1 || item.body["detectorIndex"] == 3);
    let mut bucket = create_test_bucket(1_500_000_000, &[0.1, 0.2, 0.3, 0.4, 0.5], &[]);

    let outcome = persister.persist_bucket(JOB_ID, &mut bucket).await;

    // bucket body + 3 surviving records
    assert_eq!(outcome.documents_written, 4);
    assert_eq!(outcome.documents_failed, 2);
    let record_warnings: Vec<_> = outcome.warnings_for(DocumentKind::Record).collect();
    assert_eq!(record_warnings.len(), 1);
    assert!(record_warnings[0].message.starts_with("failure in bulk execution"));

    let records = bucket.records.as_ref().unwrap();
    assert!(records[0].id.is_some());
    assert!(records[1].id.is_none());
    assert!(records[3].id.is_none());
}

#[tokio::test]
async fn test_interim_flag_is_propagated_to_influencers() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_000_000, &[0.01], &["host"]);
    bucket.is_interim = true;
    bucket.influencers = vec![create_test_influencer("host", "web-7")];

    persister.persist_bucket(JOB_ID, &mut bucket).await;
    store.refresh(&results_collection()).await.unwrap();

    let influencers = store.visible_documents(&results_collection(), "influencer").await;
    assert_eq!(influencers.len(), 1);
    assert_eq!(influencers[0].body["isInterim"], true);
    assert_eq!(influencers[0].id, bucket.influencers[0].id.clone().unwrap());

    let standalone = store
        .visible_documents(&results_collection(), "bucketInfluencer")
        .await;
    assert_eq!(standalone[0].body["isInterim"], true);
}

#[tokio::test]
async fn test_persisting_a_bucket_twice_appends() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_000_000, &[0.01, 0.2], &[]);
    bucket.records.as_mut().unwrap()[0].id = Some("r-from-input".to_string());

    persister.persist_bucket(JOB_ID, &mut bucket).await;
    let first_bucket_id = bucket.id.clone().unwrap();
    let first_record_id = bucket.records.as_ref().unwrap()[0].id.clone().unwrap();
    assert_ne!(first_record_id, "r-from-input");

    persister.persist_bucket(JOB_ID, &mut bucket).await;
    let second_bucket_id = bucket.id.clone().unwrap();
    assert_ne!(first_bucket_id, second_bucket_id);

    let collection = results_collection();
    assert_eq!(store.realtime_documents(&collection, "bucket").await.len(), 2);
    assert_eq!(store.realtime_documents(&collection, "record").await.len(), 4);
    assert!(store.get(&collection, "record", "r-from-input").await.is_none());
}
