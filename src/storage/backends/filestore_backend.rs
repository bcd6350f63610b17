// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! Filestore Document Store
//!
//! Durable backend keeping one JSON file per document:
//!
//! ```text
//! <root>/<collection>/<kind>/<encoded id>.json
//! ```
//!
//! Every write goes to a temporary file first and is renamed into place, so
//! a reader never observes a half-written document. Writes are visible as
//! soon as the rename returns; `refresh` fsyncs the collection directories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{DocumentId, StoreError};
use crate::storage::bulk_format::{parse_bulk_payload, RawBulkAction};
use crate::storage::traits::{
    BulkItem, BulkItemOutcome, BulkResponse, DocumentFilter, DocumentStore,
};

/// On-disk envelope around a document body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDocument {
    pub id: DocumentId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DocumentId>,
    pub source: Value,
}

pub struct FilestoreDocumentStore {
    root: PathBuf,
}

impl FilestoreDocumentStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("📂 Filestore document store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Realtime get-by-id.
    pub async fn get(
        &self,
        collection: &str,
        kind: &str,
        id: &str,
    ) -> Result<Option<FileDocument>, StoreError> {
        let path = self.document_path(collection, kind, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every document of a kind in a collection, ordered by id.
    pub async fn list(&self, collection: &str, kind: &str) -> Result<Vec<FileDocument>, StoreError> {
        let dir = self.root.join(encode_path_component(collection)).join(encode_path_component(kind));
        let mut docs = Vec::new();
        for path in json_files(&dir).await? {
            let bytes = tokio::fs::read(&path).await?;
            docs.push(serde_json::from_slice::<FileDocument>(&bytes)?);
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(encode_path_component(collection))
    }

    fn document_path(&self, collection: &str, kind: &str, id: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(encode_path_component(kind))
            .join(format!("{}.json", encode_path_component(id)))
    }

    async fn write_document(
        &self,
        collection: &str,
        kind: &str,
        id: Option<&str>,
        body: Value,
        parent: Option<DocumentId>,
    ) -> Result<DocumentId, StoreError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let path = self.document_path(collection, kind, &id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let document = FileDocument {
            id: id.clone(),
            kind: kind.to_string(),
            parent,
            source: body,
        };
        let data = serde_json::to_vec(&document)?;

        let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, &data).await?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            tokio::fs::remove_file(&staging).await.ok();
            return Err(e.into());
        }

        debug!("💾 Wrote {} bytes to {}", data.len(), path.display());
        Ok(id)
    }

    async fn write_bulk(&self, collection: &str, items: Vec<BulkItem>) -> BulkResponse {
        let start = std::time::Instant::now();
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let kind = item.kind.clone();
            let requested = item.id.clone();
            match self
                .write_document(collection, &item.kind, item.id.as_deref(), item.body, item.parent)
                .await
            {
                Ok(id) => outcomes.push(BulkItemOutcome::Written { kind, id }),
                Err(e) => outcomes.push(BulkItemOutcome::Failed {
                    kind,
                    id: requested,
                    reason: e.to_string(),
                }),
            }
        }
        BulkResponse {
            items: outcomes,
            took_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
impl DocumentStore for FilestoreDocumentStore {
    fn backend_name(&self) -> &'static str {
        "filestore"
    }

    async fn upsert(
        &self,
        collection: &str,
        kind: &str,
        id: Option<&str>,
        body: Value,
    ) -> Result<DocumentId, StoreError> {
        self.write_document(collection, kind, id, body, None).await
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        items: Vec<BulkItem>,
    ) -> Result<BulkResponse, StoreError> {
        Ok(self.write_bulk(collection, items).await)
    }

    async fn refresh(&self, collection: &str) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                sync_dir(&entry.path()).await?;
            }
        }
        sync_dir(&dir).await?;
        debug!("🔄 Synced filestore collection {}", collection);
        Ok(())
    }

    async fn bulk_delete_by_filter(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<u64, StoreError> {
        let dir = self.collection_dir(collection);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(0);
        }

        let mut deleted = 0u64;
        let mut kinds = tokio::fs::read_dir(&dir).await?;
        while let Some(kind_dir) = kinds.next_entry().await? {
            if !kind_dir.file_type().await?.is_dir() {
                continue;
            }
            for path in json_files(&kind_dir.path()).await? {
                let bytes = tokio::fs::read(&path).await?;
                let document: FileDocument = match serde_json::from_slice(&bytes) {
                    Ok(document) => document,
                    Err(e) => {
                        warn!("⚠️ Skipping unreadable document {}: {}", path.display(), e);
                        continue;
                    }
                };
                if filter.matches(&document.kind, &document.source) {
                    tokio::fs::remove_file(&path).await?;
                    deleted += 1;
                }
            }
        }

        debug!("🗑️ Deleted {} documents from filestore collection {}", deleted, collection);
        Ok(deleted)
    }

    async fn bulk_raw(&self, payload: &[u8]) -> Result<BulkResponse, StoreError> {
        let mut response = BulkResponse::default();
        for action in parse_bulk_payload(payload)? {
            match action {
                RawBulkAction::Write { collection, item } => {
                    let partial = self.write_bulk(&collection, vec![item]).await;
                    response.items.extend(partial.items);
                    response.took_ms += partial.took_ms;
                }
                skipped => {
                    warn!("Skipping bulk action: {:?}", skipped);
                    response.items.extend(skipped.skipped_outcome());
                }
            }
        }
        Ok(response)
    }
}

async fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}

async fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let handle = tokio::fs::File::open(dir).await?;
    handle.sync_all().await?;
    Ok(())
}

/// Escape everything outside `[A-Za-z0-9_-]` so ids map to safe file names.
fn encode_path_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
