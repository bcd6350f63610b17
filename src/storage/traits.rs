//! Document store client abstraction
//!
//! The results persister only ever talks to a store through this narrow
//! interface: single upsert, batched upsert, refresh, delete-by-filter and a
//! raw bulk entry point. Storage engine, query execution and replication are
//! the backend's business.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{DocumentId, StoreError};

/// One document inside a batched upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub kind: String,
    /// `None` lets the store assign an identifier
    pub id: Option<DocumentId>,
    pub body: Value,
    /// Parent document id for child documents (records under a bucket)
    pub parent: Option<DocumentId>,
}

impl BulkItem {
    pub fn new(kind: impl Into<String>, id: Option<DocumentId>, body: Value) -> Self {
        Self {
            kind: kind.into(),
            id,
            body,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<DocumentId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Per-item result of a batched upsert, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkItemOutcome {
    Written {
        kind: String,
        id: DocumentId,
    },
    Failed {
        kind: String,
        id: Option<DocumentId>,
        reason: String,
    },
}

impl BulkItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, BulkItemOutcome::Failed { .. })
    }

    pub fn written_id(&self) -> Option<&str> {
        match self {
            BulkItemOutcome::Written { id, .. } => Some(id),
            BulkItemOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemOutcome>,
    pub took_ms: u64,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(BulkItemOutcome::is_failure)
    }

    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_failure()).count()
    }

    pub fn success_count(&self) -> usize {
        self.items.len() - self.failure_count()
    }

    /// Single aggregated message describing every rejected item.
    pub fn failure_message(&self) -> String {
        let mut message = String::from("failure in bulk execution:");
        for (position, item) in self.items.iter().enumerate() {
            if let BulkItemOutcome::Failed { kind, id, reason } = item {
                message.push_str(&format!(
                    "\n[{}]: type [{}], id [{}], message [{}]",
                    position,
                    kind,
                    id.as_deref().unwrap_or("<auto>"),
                    reason
                ));
            }
        }
        message
    }
}

/// Selection of documents for a delete-by-filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFilter {
    /// Restrict to these document kinds; empty means every kind
    pub kinds: Vec<String>,
    /// Top-level body field that must equal the given value
    pub field_equals: Option<(String, Value)>,
}

impl DocumentFilter {
    /// Every result document flagged as interim.
    pub fn interim_results() -> Self {
        Self {
            kinds: vec![
                "bucket".to_string(),
                "record".to_string(),
                "influencer".to_string(),
                "bucketInfluencer".to_string(),
            ],
            field_equals: Some(("isInterim".to_string(), Value::Bool(true))),
        }
    }

    pub fn matches(&self, kind: &str, body: &Value) -> bool {
        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| k == kind) {
            return false;
        }
        match &self.field_equals {
            Some((field, expected)) => body.get(field) == Some(expected),
            None => true,
        }
    }
}

/// Document store client consumed by the results persister.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Write one document. Returns the id it was stored under, which the
    /// store generates when `id` is `None`.
    async fn upsert(
        &self,
        collection: &str,
        kind: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<DocumentId, StoreError>;

    /// Write many documents in one round trip. Individual rejections are
    /// reported in the response, not as an error.
    async fn bulk_upsert(
        &self,
        collection: &str,
        items: Vec<BulkItem>,
    ) -> Result<BulkResponse, StoreError>;

    /// Block until every prior write to the collection is visible to reads.
    async fn refresh(&self, collection: &str) -> Result<(), StoreError>;

    /// Delete every matching document, returning how many were removed.
    async fn bulk_delete_by_filter(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<u64, StoreError>;

    /// Execute a pre-formatted newline-delimited bulk payload as-is.
    async fn bulk_raw(&self, payload: &[u8]) -> Result<BulkResponse, StoreError>;
}
