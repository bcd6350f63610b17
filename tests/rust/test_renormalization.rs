//! Renormalization: targeted overwrites of already persisted results

use anomaly_results::storage::backends::StoreCall;

use crate::common::*;

#[tokio::test]
async fn test_renormalized_record_overwrites_only_itself() {
    let (store, persister) = memory_persister();
    let mut b1 = create_test_bucket(1_500_003_600, &[0.01, 0.2], &["host"]);

    persister.persist_bucket(JOB_ID, &mut b1).await;
    let b1_id = b1.id.clone().expect("B1 assigned an id");

    let records = b1.records.clone().unwrap();
    let (r1, r2) = (&records[0], &records[1]);
    for record in [r1, r2] {
        let stored = store
            .get(&results_collection(), "record", record.id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.parent.as_deref(), Some(b1_id.as_str()));
    }
    let influencer = store
        .get(&results_collection(), "bucketInfluencer", &format!("{}host", b1_id))
        .await;
    assert!(influencer.is_some());

    store.clear_calls();
    let mut renormalized = r2.clone();
    renormalized.probability = 0.05;
    let outcome = persister
        .update_records(JOB_ID, &b1_id, std::slice::from_ref(&renormalized))
        .await;
    assert!(outcome.is_success());

    let calls = store.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        StoreCall::BulkUpsert { items, .. } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].id, r2.id);
        }
        other => panic!("unexpected call {:?}", other),
    }

    let r1_after = store
        .get(&results_collection(), "record", r1.id.as_deref().unwrap())
        .await
        .unwrap();
    let r2_after = store
        .get(&results_collection(), "record", r2.id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(r1_after.version, 1);
    assert_eq!(r1_after.body["probability"], 0.01);
    assert_eq!(r2_after.version, 2);
    assert_eq!(r2_after.body["probability"], 0.05);
    assert_eq!(r2_after.parent.as_deref(), Some(b1_id.as_str()));
}

#[tokio::test]
async fn test_update_bucket_rewrites_scores_in_place() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_007_200, &[0.01], &["host", "user"]);
    bucket
        .per_partition_max_probability
        .insert("eu".to_string(), 0.3);
    persister.persist_bucket(JOB_ID, &mut bucket).await;
    let bucket_id = bucket.id.clone().unwrap();

    bucket.anomaly_score = 91.0;
    bucket.bucket_influencers[1].anomaly_score = 77.0;
    bucket
        .per_partition_max_probability
        .insert("eu".to_string(), 0.9);
    let outcome = persister.update_bucket(JOB_ID, &bucket).await;
    assert_eq!(outcome.documents_written, 4);

    let body = store
        .get(&results_collection(), "bucket", &bucket_id)
        .await
        .unwrap();
    assert_eq!(body.body["anomalyScore"], 91.0);
    assert_eq!(
        store
            .realtime_documents(&results_collection(), "bucket")
            .await
            .len(),
        1
    );

    let user = store
        .get(&results_collection(), "bucketInfluencer", &format!("{}user", bucket_id))
        .await
        .unwrap();
    assert_eq!(user.body["anomalyScore"], 77.0);
    assert_eq!(
        store
            .realtime_documents(&results_collection(), "bucketInfluencer")
            .await
            .len(),
        2
    );

    let summary = store
        .get(&results_collection(), "partitionNormalizedProb", &bucket_id)
        .await
        .unwrap();
    assert_eq!(summary.body["partitionNormalizedProbs"][0]["maxNormalizedProbability"], 0.9);
}

#[tokio::test]
async fn test_failed_bucket_update_attempts_nothing_else() {
    let (store, persister) = memory_persister();
    let mut bucket = create_test_bucket(1_500_010_800, &[0.01], &["host"]);
    bucket
        .per_partition_max_probability
        .insert("eu".to_string(), 0.3);
    persister.persist_bucket(JOB_ID, &mut bucket).await;

    store.clear_calls();
    store.fail_upserts_of_kind("bucket");
    let outcome = persister.update_bucket(JOB_ID, &bucket).await;

    assert_eq!(outcome.documents_written, 0);
    assert_eq!(written_kinds(&store.calls()), vec!["bucket"]);
}

#[tokio::test]
async fn test_influencer_update_shares_the_create_path() {
    let (store, persister) = memory_persister();
    let mut influencer = create_test_influencer("user", "alice");
    influencer.id = Some("inf-1".to_string());

    persister.persist_influencer(JOB_ID, Some(&influencer)).await;
    influencer.anomaly_score = 55.0;
    persister.update_influencer(JOB_ID, Some(&influencer)).await;

    let stored = store
        .get(&results_collection(), "influencer", "inf-1")
        .await
        .unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.body["anomalyScore"], 55.0);
}
