// Copyright 2025 ProximaDB
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.

//! Document Store Backends
//!
//! - Memory - non-durable, refresh-visibility model, call journal (tests, dry runs)
//! - Filestore - one JSON file per document with atomic renames

pub mod filestore_backend;
pub mod memory_backend;

use std::sync::Arc;

use crate::core::{StoreBackend, StoreConfig, StoreError};
use crate::storage::traits::DocumentStore;

pub use filestore_backend::{FileDocument, FilestoreDocumentStore};
pub use memory_backend::{JournaledItem, MemoryDocumentStore, StoreCall, StoredDocument};

/// Build the configured backend behind a shared handle.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        StoreBackend::Filestore => Arc::new(FilestoreDocumentStore::new(&config.data_dir).await?),
    };
    tracing::info!("🚀 Opened {} document store", store.backend_name());
    Ok(store)
}
