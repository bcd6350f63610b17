//! Full job lifecycle against the file-backed store

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use anomaly_results::{
    open_store, DocumentStore, FilestoreDocumentStore, ResultsPersister, StoreBackend,
    StoreConfig,
};

use crate::common::*;

async fn filestore_persister() -> Result<(TempDir, Arc<FilestoreDocumentStore>, ResultsPersister)> {
    init_test_env();
    let temp_dir = TempDir::new()?;
    let store = Arc::new(FilestoreDocumentStore::new(temp_dir.path()).await?);
    let persister = ResultsPersister::new(store.clone());
    Ok((temp_dir, store, persister))
}

#[tokio::test]
async fn test_bucket_layout_on_disk() -> Result<()> {
    let (_temp_dir, store, persister) = filestore_persister().await?;
    let mut bucket = create_test_bucket(1_500_000_000, &[0.01, 0.2], &["host"]);
    bucket
        .per_partition_max_probability
        .insert("eu/west".to_string(), 0.5);

    let outcome = persister.persist_bucket(JOB_ID, &mut bucket).await;
    assert!(outcome.is_success(), "{:?}", outcome);
    let bucket_id = bucket.id.clone().unwrap();

    let collection = results_collection();
    assert_eq!(store.list(&collection, "bucket").await?.len(), 1);
    let records = store.list(&collection, "record").await?;
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.parent.as_deref() == Some(bucket_id.as_str())));

    let standalone = store
        .get(&collection, "bucketInfluencer", &format!("{}host", bucket_id))
        .await?
        .expect("standalone bucket influencer");
    assert_eq!(standalone.source["influencerFieldName"], "host");

    let summary = store
        .get(&collection, "partitionNormalizedProb", &bucket_id)
        .await?
        .expect("partition summary");
    assert_eq!(
        summary.source["partitionNormalizedProbs"][0]["partitionFieldValue"],
        "eu/west"
    );
    Ok(())
}

#[tokio::test]
async fn test_interim_results_replaced_by_final_ones() -> Result<()> {
    let (_temp_dir, store, persister) = filestore_persister().await?;
    let collection = results_collection();

    let mut interim = create_test_bucket(1_500_000_000, &[0.3], &["host"]);
    interim.is_interim = true;
    persister.persist_bucket(JOB_ID, &mut interim).await;

    let mut final_bucket = create_test_bucket(1_500_000_000, &[0.3], &["host"]);
    persister.delete_interim_results(JOB_ID);
    assert_eq!(persister.drain_background_tasks().await, 1);
    persister.persist_bucket(JOB_ID, &mut final_bucket).await;
    assert!(persister.commit_writes(JOB_ID).await);

    let buckets = store.list(&collection, "bucket").await?;
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].id, final_bucket.id.clone().unwrap());
    assert_eq!(buckets[0].source["isInterim"], false);

    let influencers = store.list(&collection, "bucketInfluencer").await?;
    assert_eq!(influencers.len(), 1);
    assert_eq!(influencers[0].source["isInterim"], false);
    Ok(())
}

#[tokio::test]
async fn test_bulk_state_and_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = StoreConfig {
        backend: StoreBackend::Filestore,
        data_dir: temp_dir.path().to_path_buf(),
    };

    {
        let persister = ResultsPersister::new(open_store(&config).await?);
        let payload = format!(
            "{{\"index\":{{\"_index\":\"{c}\",\"_type\":\"modelState\",\"_id\":\"{j}_model_state_1\"}}}}\n{{\"chunk\":1}}\n\
             {{\"index\":{{\"_index\":\"{c}\",\"_type\":\"modelState\",\"_id\":\"{j}_model_state_2\"}}}}\n{{\"chunk\":2}}\n",
            c = results_collection(),
            j = JOB_ID
        );
        let outcome = persister.persist_bulk_state(payload.as_bytes()).await;
        assert_eq!(outcome.documents_written, 2);
        assert!(persister
            .persist_quantiles(JOB_ID, Some(&create_test_quantiles("durable")))
            .await
            .is_success());
    }

    let reopened = FilestoreDocumentStore::new(temp_dir.path()).await?;
    assert_eq!(reopened.backend_name(), "filestore");
    let state = reopened.list(&results_collection(), "modelState").await?;
    assert_eq!(state.len(), 2);
    assert_eq!(state[1].source["chunk"], 2);

    let quantiles = reopened
        .get(&results_collection(), "quantiles", "hierarchical")
        .await?
        .expect("quantiles survive a reopen");
    assert_eq!(quantiles.source["quantileState"], "durable");
    Ok(())
}
