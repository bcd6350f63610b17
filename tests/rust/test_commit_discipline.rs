//! Commit discipline and the single-document write path

use anomaly_results::storage::backends::StoreCall;
use anomaly_results::{CategoryDefinition, DocumentKind, ModelSizeStats, MemoryStatus};

use crate::common::*;

fn size_stats(model_bytes: u64) -> ModelSizeStats {
    ModelSizeStats {
        job_id: JOB_ID.to_string(),
        model_bytes,
        total_by_field_count: 10,
        total_over_field_count: 0,
        total_partition_field_count: 2,
        bucket_allocation_failures_count: 0,
        memory_status: MemoryStatus::SoftLimit,
        timestamp: None,
        log_time: None,
    }
}

#[tokio::test]
async fn test_quantiles_written_twice_leave_one_visible_document() {
    let (store, persister) = memory_persister();

    persister
        .persist_quantiles(JOB_ID, Some(&create_test_quantiles("v1")))
        .await;
    persister
        .persist_quantiles(JOB_ID, Some(&create_test_quantiles("v2")))
        .await;

    let quantiles = store.visible_documents(&results_collection(), "quantiles").await;
    assert_eq!(quantiles.len(), 1);
    assert_eq!(quantiles[0].body["quantileState"], "v2");
    assert_eq!(store.refresh_count(), 2);
}

#[tokio::test]
async fn test_other_kinds_are_not_visible_until_committed() {
    let (store, persister) = memory_persister();
    let category = CategoryDefinition {
        job_id: JOB_ID.to_string(),
        category_id: 7,
        terms: "connection refused".to_string(),
        regex: ".*?connection.+?refused.*".to_string(),
        max_matching_length: 64,
        examples: vec!["connection to db-1 refused".to_string()],
    };

    persister
        .persist_category_definition(JOB_ID, Some(&category))
        .await;
    persister
        .persist_influencer(JOB_ID, Some(&create_test_influencer("host", "db-1")))
        .await;
    persister
        .persist_model_size_stats(JOB_ID, Some(&size_stats(1 << 20)))
        .await;

    assert_eq!(store.refresh_count(), 0);
    assert_eq!(store.count(&results_collection(), "categoryDefinition").await, 0);
    assert!(store
        .get(&results_collection(), "categoryDefinition", "7")
        .await
        .is_some());

    assert!(persister.commit_writes(JOB_ID).await);
    assert_eq!(store.count(&results_collection(), "categoryDefinition").await, 1);
    assert_eq!(store.count(&results_collection(), "influencer").await, 1);
    assert_eq!(store.count(&results_collection(), "modelSizeStats").await, 2);
}

#[tokio::test]
async fn test_size_stats_keep_history_and_latest() {
    let (store, persister) = memory_persister();

    for bytes in [1_000, 2_000, 3_000] {
        let outcome = persister
            .persist_model_size_stats(JOB_ID, Some(&size_stats(bytes)))
            .await;
        assert_eq!(outcome.documents_written, 2);
    }
    persister.commit_writes(JOB_ID).await;

    let upserts = store
        .calls()
        .iter()
        .filter(|call| matches!(call, StoreCall::Upsert { .. }))
        .count();
    assert_eq!(upserts, 6);

    let stats = store.visible_documents(&results_collection(), "modelSizeStats").await;
    assert_eq!(stats.len(), 4);
    let latest = stats
        .iter()
        .find(|doc| doc.id == "modelSizeStats")
        .expect("latest copy");
    assert_eq!(latest.body["modelBytes"], 3_000);
    assert_eq!(latest.body["memoryStatus"], "soft_limit");
    assert_eq!(latest.version, 3);
}

#[tokio::test]
async fn test_absent_objects_report_nothing_to_persist() {
    let (store, persister) = memory_persister();

    let outcomes = vec![
        persister.persist_category_definition(JOB_ID, None).await,
        persister.persist_quantiles(JOB_ID, None).await,
        persister.persist_model_snapshot(JOB_ID, None).await,
        persister.persist_model_size_stats(JOB_ID, None).await,
        persister.persist_model_debug_output(JOB_ID, None).await,
        persister.persist_influencer(JOB_ID, None).await,
    ];

    assert_eq!(store.call_count(), 0);
    for outcome in &outcomes {
        assert!(!outcome.is_success());
        assert_eq!(outcome.documents_failed, 0);
        assert_eq!(outcome.warnings.len(), 1);
    }
    assert_eq!(
        outcomes[1].warnings_for(DocumentKind::Quantiles).next().unwrap().message,
        format!("No quantiles to persist for job {}", JOB_ID)
    );
}

#[tokio::test]
async fn test_failed_commit_is_reported_on_quantiles() {
    let (store, persister) = memory_persister();
    store.fail_refresh();

    let outcome = persister
        .persist_quantiles(JOB_ID, Some(&create_test_quantiles("v1")))
        .await;

    assert_eq!(outcome.documents_written, 1);
    assert_eq!(outcome.warnings_for(DocumentKind::Quantiles).count(), 1);
    assert!(!persister.commit_writes(JOB_ID).await);
}
