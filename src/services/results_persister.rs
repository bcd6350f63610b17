// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! Results Persister - write coordination for anomaly detection output
//!
//! Decomposes the result tree of a job into documents of its results
//! collection and rewrites subsets of them after renormalization.
//!
//! Layout of a persisted bucket:
//! - the bucket document itself, store-assigned id, reused on update
//! - one standalone copy per bucket influencer, id = bucket id + field name,
//!   so renormalization overwrites it without touching the bucket
//! - influencers, store-assigned ids
//! - anomaly records, store-assigned ids, each a child of the bucket
//! - a per-partition max probability summary under the bucket's own id
//!
//! ## Design Principles:
//! - Best effort: no error ever reaches the caller, every failure is logged
//!   and reported as a warning inside the returned `WriteOutcome`
//! - Stateless: the job id is passed per call, the store handle is shared
//! - Visibility is only forced where a reader depends on it (quantiles)

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::core::{
    AnomalyRecord, Bucket, BucketInfluencer, CategoryDefinition, DocumentId, Influencer,
    ModelDebugOutput, ModelSizeStats, ModelSnapshot, PersistenceError, Quantiles,
};
use crate::persistence::batch_writer::BatchWriter;
use crate::persistence::identity::{
    self, bucket_influencer_id, results_collection_name, DocumentIdentity, DocumentKind,
};
use crate::persistence::outcome::WriteOutcome;
use crate::persistence::serializer;
use crate::storage::traits::{DocumentFilter, DocumentStore};

type Serializer<T> = fn(DocumentKind, &T) -> Result<Value, PersistenceError>;

/// One single-document write: the object (absent means "nothing to do"),
/// its kind, its id policy and its serializer.
pub struct Persistable<'a, T> {
    object: Option<&'a T>,
    kind: DocumentKind,
    identity: fn(&T) -> DocumentIdentity,
    serializer: Serializer<T>,
}

impl<'a, T: Serialize> Persistable<'a, T> {
    pub fn new(
        object: Option<&'a T>,
        kind: DocumentKind,
        identity: fn(&T) -> DocumentIdentity,
    ) -> Self {
        Self {
            object,
            kind,
            identity,
            serializer: serializer::to_document::<T>,
        }
    }
}

impl<'a, T> Persistable<'a, T> {
    pub fn with_serializer(mut self, serializer: Serializer<T>) -> Self {
        self.serializer = serializer;
        self
    }
}

/// Results persister shared by every job writing to the same store
#[derive(Clone)]
pub struct ResultsPersister {
    store: Arc<dyn DocumentStore>,
    /// Fire-and-forget tasks, kept so shutdown can wait for them
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ResultsPersister {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            background_tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Persist a bucket and everything it carries.
    ///
    /// A bucket without a record collection is skipped entirely. Each step is
    /// isolated from the failures of the others, except that children which
    /// embed the bucket id are skipped when the bucket never got one.
    ///
    /// The bucket, its influencers and its records are always appended under
    /// fresh store-assigned ids, whatever ids they arrive with; the new ids
    /// are written back onto the objects for later updates.
    pub async fn persist_bucket(&self, job_id: &str, bucket: &mut Bucket) -> WriteOutcome {
        let mut outcome = WriteOutcome::new();
        if bucket.records.is_none() {
            return outcome;
        }

        let collection = results_collection_name(job_id);
        let bucket_time = bucket.timestamp;
        let is_interim = bucket.is_interim;

        // Always appended; a failed body write leaves no id for the children to use
        bucket.id = None;
        match self
            .write_single(
                job_id,
                &collection,
                DocumentKind::Bucket,
                DocumentIdentity::StoreAssigned,
                serializer::to_document(DocumentKind::Bucket, &*bucket),
            )
            .await
        {
            Ok(id) => {
                bucket.id = Some(id);
                outcome.merge(WriteOutcome::written(1));
            }
            Err(failed) => outcome.merge(failed),
        }

        match bucket.id.clone() {
            Some(bucket_id) => {
                outcome.merge(
                    self.persist_bucket_influencers_standalone(
                        job_id,
                        &collection,
                        &bucket_id,
                        &bucket.bucket_influencers,
                        bucket_time,
                        is_interim,
                    )
                    .await,
                );
            }
            None => outcome.warn(
                DocumentKind::BucketInfluencer,
                format!(
                    "skipped {} bucket influencers: bucket at epoch {} has no id",
                    bucket.bucket_influencers.len(),
                    bucket.epoch()
                ),
            ),
        }

        if !bucket.influencers.is_empty() {
            let mut batch = BatchWriter::new(job_id, &collection, DocumentKind::Influencer);
            for influencer in bucket.influencers.iter_mut() {
                influencer.timestamp = Some(bucket_time);
                influencer.is_interim = is_interim;
                batch.add(
                    DocumentIdentity::StoreAssigned,
                    serializer::to_document(DocumentKind::Influencer, &*influencer),
                    None,
                );
            }
            let result = batch.execute(self.store.as_ref()).await;
            for (influencer, assigned) in bucket.influencers.iter_mut().zip(result.assigned_ids) {
                if assigned.is_some() {
                    influencer.id = assigned;
                }
            }
            outcome.merge(result.outcome);
        }

        let bucket_id = bucket.id.clone();
        if let Some(records) = bucket.records.as_mut().filter(|records| !records.is_empty()) {
            match bucket_id.as_deref() {
                Some(bucket_id) => {
                    let mut batch = BatchWriter::new(job_id, &collection, DocumentKind::Record);
                    for record in records.iter_mut() {
                        record.timestamp = Some(bucket_time);
                        batch.add(
                            DocumentIdentity::StoreAssigned,
                            serializer::to_document(DocumentKind::Record, &*record),
                            Some(bucket_id),
                        );
                    }
                    let result = batch.execute(self.store.as_ref()).await;
                    for (record, assigned) in records.iter_mut().zip(result.assigned_ids) {
                        if assigned.is_some() {
                            record.id = assigned;
                        }
                    }
                    outcome.merge(result.outcome);
                }
                None => outcome.warn(
                    DocumentKind::Record,
                    format!("skipped {} records: parent bucket has no id", records.len()),
                ),
            }
        }

        if bucket.id.is_some() {
            outcome.merge(self.persist_per_partition_max_probabilities(job_id, bucket).await);
        }

        outcome
    }

    /// Overwrite a bucket in place after renormalization, then its standalone
    /// influencers and partition summary. Nothing after the bucket body is
    /// attempted if the body write fails.
    pub async fn update_bucket(&self, job_id: &str, bucket: &Bucket) -> WriteOutcome {
        let collection = results_collection_name(job_id);
        let Some(bucket_id) = bucket.id.as_deref() else {
            warn!(
                "Cannot update bucket at epoch {} for job {}: it has no id",
                bucket.epoch(),
                job_id
            );
            return WriteOutcome::failed(DocumentKind::Bucket, 0, "bucket has no id to update");
        };

        if let Err(failed) = self
            .write_single(
                job_id,
                &collection,
                DocumentKind::Bucket,
                DocumentIdentity::Assigned(bucket_id.to_string()),
                serializer::to_document(DocumentKind::Bucket, bucket),
            )
            .await
        {
            return failed;
        }

        let mut outcome = WriteOutcome::written(1);
        outcome.merge(
            self.persist_bucket_influencers_standalone(
                job_id,
                &collection,
                bucket_id,
                &bucket.bucket_influencers,
                bucket.timestamp,
                bucket.is_interim,
            )
            .await,
        );
        outcome.merge(self.persist_per_partition_max_probabilities(job_id, bucket).await);
        outcome
    }

    /// Overwrite renormalized records at their existing ids, as children of
    /// `bucket_id`.
    pub async fn update_records(
        &self,
        job_id: &str,
        bucket_id: &str,
        records: &[AnomalyRecord],
    ) -> WriteOutcome {
        let collection = results_collection_name(job_id);
        let mut batch = BatchWriter::new(job_id, &collection, DocumentKind::Record);
        for record in records {
            if record.id.is_none() {
                warn!(
                    "Updating a record without an id for bucket {} in job {}, the store will assign one",
                    bucket_id, job_id
                );
            }
            batch.add(
                identity::record(record),
                serializer::to_document(DocumentKind::Record, record),
                Some(bucket_id),
            );
        }
        batch.execute(self.store.as_ref()).await.outcome
    }

    /// Write one independently addressable copy per bucket influencer. The
    /// id is the bucket id followed by the field name, so running this again
    /// with new scores overwrites instead of duplicating.
    async fn persist_bucket_influencers_standalone(
        &self,
        job_id: &str,
        collection: &str,
        bucket_id: &str,
        bucket_influencers: &[BucketInfluencer],
        bucket_time: DateTime<Utc>,
        is_interim: bool,
    ) -> WriteOutcome {
        if bucket_influencers.is_empty() {
            return WriteOutcome::new();
        }

        let mut batch = BatchWriter::new(job_id, collection, DocumentKind::BucketInfluencer);
        for influencer in bucket_influencers {
            batch.add(
                DocumentIdentity::Assigned(bucket_influencer_id(
                    bucket_id,
                    &influencer.influencer_field_name,
                )),
                serializer::bucket_influencer_standalone(influencer, bucket_time, is_interim),
                None,
            );
        }
        batch.execute(self.store.as_ref()).await.outcome
    }

    async fn persist_per_partition_max_probabilities(
        &self,
        job_id: &str,
        bucket: &Bucket,
    ) -> WriteOutcome {
        if bucket.per_partition_max_probability.is_empty() {
            return WriteOutcome::new();
        }
        let Some(bucket_id) = bucket.id.as_deref() else {
            return WriteOutcome::new();
        };

        let collection = results_collection_name(job_id);
        let body = serializer::partition_normalized_probs(job_id, bucket);
        match self
            .write_single(
                job_id,
                &collection,
                DocumentKind::PartitionNormalizedProb,
                DocumentIdentity::Assigned(bucket_id.to_string()),
                Ok(body),
            )
            .await
        {
            Ok(_) => WriteOutcome::written(1),
            Err(failed) => failed,
        }
    }

    // =========================================================================
    // Single documents
    // =========================================================================

    /// Generic single-document write shared by every standalone kind.
    pub async fn persist_one<T>(&self, job_id: &str, persistable: Persistable<'_, T>) -> WriteOutcome {
        let kind = persistable.kind;
        let Some(object) = persistable.object else {
            warn!("No {} to persist for job {}", kind, job_id);
            return WriteOutcome::nothing_to_persist(kind, job_id);
        };

        let collection = results_collection_name(job_id);
        let identity = (persistable.identity)(object);
        let body = (persistable.serializer)(kind, object);
        match self.write_single(job_id, &collection, kind, identity, body).await {
            Ok(_) => WriteOutcome::written(1),
            Err(failed) => failed,
        }
    }

    /// One upsert with the shared tracing and failure reporting. A body that
    /// failed to serialize is reported without calling the store.
    async fn write_single(
        &self,
        job_id: &str,
        collection: &str,
        kind: DocumentKind,
        identity: DocumentIdentity,
        body: Result<Value, PersistenceError>,
    ) -> Result<DocumentId, WriteOutcome> {
        trace!(
            "STORE CALL: index type {} to collection {} {}",
            kind,
            collection,
            identity
        );
        let written = match body {
            Ok(body) => self
                .store
                .upsert(collection, kind.type_name(), identity.as_id(), body)
                .await
                .map_err(PersistenceError::from),
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            error!("Error writing {} for job {}: {}", kind, job_id, e);
            WriteOutcome::failed(kind, 1, e.to_string())
        })
    }

    // Not committed: high volume, and this process never reads them back.
    pub async fn persist_category_definition(
        &self,
        job_id: &str,
        category: Option<&CategoryDefinition>,
    ) -> WriteOutcome {
        self.persist_one(
            job_id,
            Persistable::new(
                category,
                DocumentKind::CategoryDefinition,
                identity::category_definition,
            ),
        )
        .await
    }

    /// Quantiles always overwrite the single quantiles document of the job.
    /// A successful write is committed straight away because normalization
    /// searches for the quantiles right after they are written.
    pub async fn persist_quantiles(&self, job_id: &str, quantiles: Option<&Quantiles>) -> WriteOutcome {
        let mut outcome = self
            .persist_one(
                job_id,
                Persistable::new(quantiles, DocumentKind::Quantiles, identity::quantiles),
            )
            .await;
        if outcome.is_success() && !self.commit_writes(job_id).await {
            outcome.warn(
                DocumentKind::Quantiles,
                format!("quantiles written but commit failed for job {}", job_id),
            );
        }
        outcome
    }

    /// Only the snapshot description; the model state goes through
    /// `persist_bulk_state`.
    pub async fn persist_model_snapshot(
        &self,
        job_id: &str,
        snapshot: Option<&ModelSnapshot>,
    ) -> WriteOutcome {
        self.persist_one(
            job_id,
            Persistable::new(snapshot, DocumentKind::ModelSnapshot, identity::model_snapshot),
        )
        .await
    }

    /// Two writes per sample: an appended history copy and the overwritten
    /// latest-value copy.
    pub async fn persist_model_size_stats(
        &self,
        job_id: &str,
        stats: Option<&ModelSizeStats>,
    ) -> WriteOutcome {
        let Some(sample) = stats else {
            warn!("No {} to persist for job {}", DocumentKind::ModelSizeStats, job_id);
            return WriteOutcome::nothing_to_persist(DocumentKind::ModelSizeStats, job_id);
        };
        trace!("Persisting model size stats, for size {}", sample.model_bytes);

        let mut outcome = self
            .persist_one(
                job_id,
                Persistable::new(
                    stats,
                    DocumentKind::ModelSizeStats,
                    identity::model_size_stats_history,
                ),
            )
            .await;
        outcome.merge(
            self.persist_one(
                job_id,
                Persistable::new(
                    stats,
                    DocumentKind::ModelSizeStats,
                    identity::model_size_stats_latest,
                ),
            )
            .await,
        );
        outcome
    }

    pub async fn persist_model_debug_output(
        &self,
        job_id: &str,
        output: Option<&ModelDebugOutput>,
    ) -> WriteOutcome {
        self.persist_one(
            job_id,
            Persistable::new(output, DocumentKind::ModelDebugOutput, identity::model_debug_output),
        )
        .await
    }

    pub async fn persist_influencer(&self, job_id: &str, influencer: Option<&Influencer>) -> WriteOutcome {
        self.persist_one(
            job_id,
            Persistable::new(influencer, DocumentKind::Influencer, identity::influencer),
        )
        .await
    }

    /// Creating and updating an influencer are the same write.
    pub async fn update_influencer(&self, job_id: &str, influencer: Option<&Influencer>) -> WriteOutcome {
        self.persist_influencer(job_id, influencer).await
    }

    /// Pass a pre-formatted bulk payload (model state) straight to the store.
    /// The payload is not validated here.
    pub async fn persist_bulk_state(&self, payload: &[u8]) -> WriteOutcome {
        trace!("STORE CALL: bulk index of {} bytes", payload.len());
        match self.store.bulk_raw(payload).await {
            Ok(response) => {
                let mut outcome = WriteOutcome::written(response.success_count());
                if response.has_failures() {
                    let message = response.failure_message();
                    error!("Bulk index of state has errors: {}", message);
                    outcome.merge(WriteOutcome::failed(
                        DocumentKind::BulkState,
                        response.failure_count(),
                        message,
                    ));
                }
                outcome
            }
            Err(e) => {
                error!("Error persisting bulk state: {}", e);
                let mut outcome = WriteOutcome::new();
                outcome.warn(DocumentKind::BulkState, e.to_string());
                outcome
            }
        }
    }

    // =========================================================================
    // Visibility and cleanup
    // =========================================================================

    /// Refresh the job's collection, blocking until everything written so
    /// far is visible to searches.
    pub async fn commit_writes(&self, job_id: &str) -> bool {
        let collection = results_collection_name(job_id);
        trace!("STORE CALL: refresh collection {}", collection);
        match self.store.refresh(&collection).await {
            Ok(()) => {
                debug!("✅ Committed writes for job {}", job_id);
                true
            }
            Err(e) => {
                error!("Error refreshing collection {}: {}", collection, e);
                false
            }
        }
    }

    /// Delete every interim result of the job and commit the deletion in the
    /// background. The outcome is deliberately discarded; the task is only
    /// tracked so that `drain_background_tasks` can wait for it.
    pub fn delete_interim_results(&self, job_id: &str) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Cannot delete interim results for job {}: {}", job_id, e);
                return;
            }
        };

        let store = self.store.clone();
        let collection = results_collection_name(job_id);
        let job_id = job_id.to_string();
        let handle = runtime.spawn(async move {
            match store
                .bulk_delete_by_filter(&collection, &DocumentFilter::interim_results())
                .await
            {
                Ok(deleted) => debug!("🗑️ Deleted {} interim results for job {}", deleted, job_id),
                Err(e) => debug!("Ignoring failed interim result deletion for job {}: {}", job_id, e),
            }
            let _ = store.refresh(&collection).await;
        });

        let mut tasks = self.background_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every fire-and-forget task started so far. Returns how many
    /// were waited on.
    pub async fn drain_background_tasks(&self) -> usize {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background_tasks.lock());
        let count = tasks.len();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("Background persistence task ended abnormally: {}", e);
            }
        }
        if count > 0 {
            info!("Drained {} background persistence tasks", count);
        }
        count
    }
}
