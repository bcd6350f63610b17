// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! In-Memory Document Store
//!
//! Fast in-memory backend for result documents. Ideal for testing, development
//! and dry runs of the CLI; provides no durability.
//!
//! Writes are visible to realtime get-by-id immediately, but only become
//! visible to search-style reads (`visible_documents`, `count`) after
//! `refresh`. Every call is journaled and failures can be injected per
//! document kind, which makes the persister's write policy observable.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{DocumentId, StoreError};
use crate::storage::bulk_format::{parse_bulk_payload, RawBulkAction};
use crate::storage::traits::{
    BulkItem, BulkItemOutcome, BulkResponse, DocumentFilter, DocumentStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub kind: String,
    pub id: DocumentId,
    pub body: Value,
    pub parent: Option<DocumentId>,
    /// Bumped on every overwrite of the same (kind, id)
    pub version: u64,
}

/// Journal entry for one call made against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Upsert {
        collection: String,
        kind: String,
        id: Option<DocumentId>,
    },
    BulkUpsert {
        collection: String,
        items: Vec<JournaledItem>,
    },
    Refresh {
        collection: String,
    },
    DeleteByFilter {
        collection: String,
    },
    BulkRaw {
        actions: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JournaledItem {
    pub kind: String,
    pub id: Option<DocumentId>,
    pub parent: Option<DocumentId>,
}

type ItemPredicate = Arc<dyn Fn(&BulkItem) -> bool + Send + Sync>;

#[derive(Default)]
struct FailureInjection {
    /// Single upserts of these kinds fail with a transport error
    upsert_kinds: Vec<String>,
    /// Bulk calls containing any item of these kinds fail as a whole
    bulk_kinds: Vec<String>,
    /// Individual bulk items matching this predicate are rejected
    reject_items: Option<ItemPredicate>,
    refresh: bool,
    delete: bool,
}

type DocKey = (String, DocumentId);

#[derive(Debug, Default)]
struct CollectionState {
    visible: HashMap<DocKey, StoredDocument>,
    /// Writes (Some) and deletions (None) not yet made visible by a refresh
    unrefreshed: HashMap<DocKey, Option<StoredDocument>>,
}

impl CollectionState {
    fn realtime_get(&self, key: &DocKey) -> Option<&StoredDocument> {
        match self.unrefreshed.get(key) {
            Some(pending) => pending.as_ref(),
            None => self.visible.get(key),
        }
    }

    fn put(&mut self, kind: &str, id: DocumentId, body: Value, parent: Option<DocumentId>) {
        let key = (kind.to_string(), id.clone());
        let version = self.realtime_get(&key).map(|d| d.version + 1).unwrap_or(1);
        self.unrefreshed.insert(
            key,
            Some(StoredDocument {
                kind: kind.to_string(),
                id,
                body,
                parent,
                version,
            }),
        );
    }

    fn refresh(&mut self) -> usize {
        let applied = self.unrefreshed.len();
        for (key, pending) in self.unrefreshed.drain() {
            match pending {
                Some(doc) => {
                    self.visible.insert(key, doc);
                }
                None => {
                    self.visible.remove(&key);
                }
            }
        }
        applied
    }

    fn realtime_keys(&self) -> Vec<DocKey> {
        let mut keys: Vec<DocKey> = self
            .visible
            .keys()
            .filter(|k| !self.unrefreshed.contains_key(*k))
            .cloned()
            .collect();
        keys.extend(
            self.unrefreshed
                .iter()
                .filter(|(_, pending)| pending.is_some())
                .map(|(k, _)| k.clone()),
        );
        keys
    }
}

/// In-memory document store
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, CollectionState>>>,
    journal: Mutex<Vec<StoreCall>>,
    failures: Mutex<FailureInjection>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            journal: Mutex::new(Vec::new()),
            failures: Mutex::new(FailureInjection::default()),
        }
    }

    // Failure injection

    pub fn fail_upserts_of_kind(&self, kind: &str) {
        self.failures.lock().upsert_kinds.push(kind.to_string());
    }

    pub fn fail_bulk_of_kind(&self, kind: &str) {
        self.failures.lock().bulk_kinds.push(kind.to_string());
    }

    pub fn reject_bulk_items_where<F>(&self, predicate: F)
    where
        F: Fn(&BulkItem) -> bool + Send + Sync + 'static,
    {
        self.failures.lock().reject_items = Some(Arc::new(predicate));
    }

    pub fn fail_refresh(&self) {
        self.failures.lock().refresh = true;
    }

    pub fn fail_delete(&self) {
        self.failures.lock().delete = true;
    }

    pub fn clear_failures(&self) {
        *self.failures.lock() = FailureInjection::default();
    }

    // Inspection

    pub fn calls(&self) -> Vec<StoreCall> {
        self.journal.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.journal.lock().len()
    }

    pub fn refresh_count(&self) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|c| matches!(c, StoreCall::Refresh { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().clear();
    }

    /// Realtime get-by-id: sees writes before they are refreshed.
    pub async fn get(&self, collection: &str, kind: &str, id: &str) -> Option<StoredDocument> {
        let collections = self.collections.read().await;
        collections
            .get(collection)?
            .realtime_get(&(kind.to_string(), id.to_string()))
            .cloned()
    }

    /// Search-style read: only documents made visible by a refresh.
    pub async fn visible_documents(&self, collection: &str, kind: &str) -> Vec<StoredDocument> {
        let collections = self.collections.read().await;
        let mut docs: Vec<StoredDocument> = collections
            .get(collection)
            .map(|state| {
                state
                    .visible
                    .values()
                    .filter(|d| d.kind == kind)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub async fn count(&self, collection: &str, kind: &str) -> usize {
        self.visible_documents(collection, kind).await.len()
    }

    /// Every document including unrefreshed writes.
    pub async fn realtime_documents(&self, collection: &str, kind: &str) -> Vec<StoredDocument> {
        let collections = self.collections.read().await;
        let Some(state) = collections.get(collection) else {
            return Vec::new();
        };
        let mut docs: Vec<StoredDocument> = state
            .realtime_keys()
            .iter()
            .filter(|(k, _)| k == kind)
            .filter_map(|key| state.realtime_get(key).cloned())
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    fn record(&self, call: StoreCall) {
        self.journal.lock().push(call);
    }

    fn generate_id() -> DocumentId {
        Uuid::new_v4().simple().to_string()
    }

    async fn apply_bulk(&self, collection: &str, items: Vec<BulkItem>) -> BulkResponse {
        let start = std::time::Instant::now();
        let reject = self.failures.lock().reject_items.clone();

        let mut collections = self.collections.write().await;
        let state = collections.entry(collection.to_string()).or_default();

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            if reject.as_ref().map(|f| f(&item)).unwrap_or(false) {
                outcomes.push(BulkItemOutcome::Failed {
                    kind: item.kind,
                    id: item.id,
                    reason: "document rejected by store".to_string(),
                });
                continue;
            }
            let id = item.id.unwrap_or_else(Self::generate_id);
            state.put(&item.kind, id.clone(), item.body, item.parent);
            outcomes.push(BulkItemOutcome::Written {
                kind: item.kind,
                id,
            });
        }

        BulkResponse {
            items: outcomes,
            took_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(
        &self,
        collection: &str,
        kind: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<DocumentId, StoreError> {
        self.record(StoreCall::Upsert {
            collection: collection.to_string(),
            kind: kind.to_string(),
            id: id.map(str::to_string),
        });

        if self.failures.lock().upsert_kinds.iter().any(|k| k == kind) {
            return Err(StoreError::Transport(format!(
                "injected failure writing {} to {}",
                kind, collection
            )));
        }

        let id = id.map(str::to_string).unwrap_or_else(Self::generate_id);
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .put(kind, id.clone(), body, None);

        tracing::debug!("📝 Stored {} {} in memory collection {}", kind, id, collection);
        Ok(id)
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        items: Vec<BulkItem>,
    ) -> Result<BulkResponse, StoreError> {
        self.record(StoreCall::BulkUpsert {
            collection: collection.to_string(),
            items: items
                .iter()
                .map(|item| JournaledItem {
                    kind: item.kind.clone(),
                    id: item.id.clone(),
                    parent: item.parent.clone(),
                })
                .collect(),
        });

        let failing_kind = {
            let failures = self.failures.lock();
            items
                .iter()
                .find(|item| failures.bulk_kinds.contains(&item.kind))
                .map(|item| item.kind.clone())
        };
        if let Some(kind) = failing_kind {
            return Err(StoreError::Transport(format!(
                "injected failure in bulk write of {} to {}",
                kind, collection
            )));
        }

        Ok(self.apply_bulk(collection, items).await)
    }

    async fn refresh(&self, collection: &str) -> Result<(), StoreError> {
        self.record(StoreCall::Refresh {
            collection: collection.to_string(),
        });

        if self.failures.lock().refresh {
            return Err(StoreError::Transport(format!(
                "injected failure refreshing {}",
                collection
            )));
        }

        let mut collections = self.collections.write().await;
        let applied = collections
            .get_mut(collection)
            .map(CollectionState::refresh)
            .unwrap_or(0);
        tracing::debug!("🔄 Refreshed memory collection {} ({} pending changes)", collection, applied);
        Ok(())
    }

    async fn bulk_delete_by_filter(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<u64, StoreError> {
        self.record(StoreCall::DeleteByFilter {
            collection: collection.to_string(),
        });

        if self.failures.lock().delete {
            return Err(StoreError::Transport(format!(
                "injected failure deleting from {}",
                collection
            )));
        }

        let mut collections = self.collections.write().await;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let doomed: Vec<DocKey> = state
            .realtime_keys()
            .into_iter()
            .filter(|key| {
                state
                    .realtime_get(key)
                    .map(|doc| filter.matches(&doc.kind, &doc.body))
                    .unwrap_or(false)
            })
            .collect();

        for key in &doomed {
            state.unrefreshed.insert(key.clone(), None);
        }

        tracing::debug!("🗑️ Deleted {} documents from memory collection {}", doomed.len(), collection);
        Ok(doomed.len() as u64)
    }

    async fn bulk_raw(&self, payload: &[u8]) -> Result<BulkResponse, StoreError> {
        let actions = parse_bulk_payload(payload)?;
        self.record(StoreCall::BulkRaw {
            actions: actions.len(),
        });

        let mut response = BulkResponse::default();
        let mut by_collection: Vec<(String, Vec<BulkItem>)> = Vec::new();
        for action in actions {
            let (collection, item) = match action {
                RawBulkAction::Write { collection, item } => (collection, item),
                skipped => {
                    response.items.extend(skipped.skipped_outcome());
                    continue;
                }
            };
            match by_collection.iter_mut().find(|(c, _)| *c == collection) {
                Some((_, items)) => items.push(item),
                None => by_collection.push((collection, vec![item])),
            }
        }
        for (collection, items) in by_collection {
            let partial = self.apply_bulk(&collection, items).await;
            response.items.extend(partial.items);
            response.took_ms += partial.took_ms;
        }
        Ok(response)
    }
}
