//! Batch writer
//!
//! Accumulates sibling documents of one kind (all records of a bucket, all
//! of its influencers...) and submits them in a single bulk round trip.
//! Rejected items are aggregated into one logged failure; nothing is rolled
//! back and nothing is retried.

use serde_json::Value;
use tracing::{error, trace};

use super::identity::{DocumentIdentity, DocumentKind};
use super::outcome::WriteOutcome;
use crate::core::{DocumentId, PersistenceError};
use crate::storage::traits::{BulkItem, DocumentStore};

pub struct BatchWriter {
    job_id: String,
    collection: String,
    kind: DocumentKind,
    items: Vec<BulkItem>,
    /// For each `add`, the index of its bulk item or `None` if it was dropped
    slots: Vec<Option<usize>>,
    outcome: WriteOutcome,
}

/// Result of executing a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub outcome: WriteOutcome,
    /// Id each added document was stored under, in `add` order. `None` for
    /// documents that were dropped or rejected.
    pub assigned_ids: Vec<Option<DocumentId>>,
}

impl BatchWriter {
    pub fn new(job_id: &str, collection: &str, kind: DocumentKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            collection: collection.to_string(),
            kind,
            items: Vec::new(),
            slots: Vec::new(),
            outcome: WriteOutcome::new(),
        }
    }

    /// Queue one document. A body that failed to serialize is dropped from
    /// the batch and reported, its siblings are still written.
    pub fn add(
        &mut self,
        identity: DocumentIdentity,
        body: Result<Value, PersistenceError>,
        parent: Option<&str>,
    ) {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                error!(
                    "Error serializing {} for job {}: {}",
                    self.kind, self.job_id, e
                );
                self.outcome.merge(WriteOutcome::failed(
                    self.kind,
                    1,
                    format!("serialization failed: {}", e),
                ));
                self.slots.push(None);
                return;
            }
        };

        match parent {
            Some(parent) => trace!(
                "STORE BULK ACTION: index type {} to collection {} {}, for bucket {}",
                self.kind,
                self.collection,
                identity,
                parent
            ),
            None => trace!(
                "STORE BULK ACTION: index type {} to collection {} {}",
                self.kind,
                self.collection,
                identity
            ),
        }

        let mut item = BulkItem::new(self.kind.type_name(), identity.into_id(), body);
        item.parent = parent.map(str::to_string);
        self.slots.push(Some(self.items.len()));
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Submit the batch. Never fails: store errors and per-item rejections
    /// are logged and folded into the returned outcome.
    pub async fn execute(self, store: &dyn DocumentStore) -> BatchResult {
        let BatchWriter {
            job_id,
            collection,
            kind,
            items,
            slots,
            mut outcome,
        } = self;

        if items.is_empty() {
            return BatchResult {
                outcome,
                assigned_ids: vec![None; slots.len()],
            };
        }

        let submitted = items.len();
        trace!("STORE CALL: bulk request with {} actions", submitted);

        let response = match store.bulk_upsert(&collection, items).await {
            Ok(response) => response,
            Err(e) => {
                error!("Bulk index of {} for job {} failed: {}", kind, job_id, e);
                outcome.merge(WriteOutcome::failed(
                    kind,
                    submitted,
                    format!("bulk request failed: {}", e),
                ));
                return BatchResult {
                    outcome,
                    assigned_ids: vec![None; slots.len()],
                };
            }
        };

        if response.has_failures() {
            let message = response.failure_message();
            error!("Bulk index of {} for job {} has errors: {}", kind, job_id, message);
            outcome.merge(WriteOutcome::failed(kind, response.failure_count(), message));
        }
        outcome.documents_written += response.success_count();

        let assigned_ids = slots
            .iter()
            .map(|slot| {
                slot.and_then(|index| response.items.get(index))
                    .and_then(|item| item.written_id())
                    .map(str::to_string)
            })
            .collect();

        BatchResult {
            outcome,
            assigned_ids,
        }
    }
}
