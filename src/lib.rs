/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! # Anomaly Results - job-scoped result persistence
//!
//! Writes the output of an anomaly detection job (buckets, records,
//! influencers, quantiles, model snapshots and statistics) into a document
//! store, one results collection per job.
//!
//! ## Key Features
//!
//! - **Deterministic ids** where a later write must overwrite an earlier one
//! - **Batched siblings**: records and influencers of a bucket in one round trip
//! - **Best-effort writes**: failures are logged and reported, never raised
//! - **Explicit visibility**: commit only where a reader needs it
//! - **Pluggable stores**: in-memory and file-backed backends

pub mod core;
pub mod persistence;
pub mod services;
pub mod storage;

pub use crate::core::*;
pub use persistence::{DocumentIdentity, DocumentKind, PersistWarning, WriteOutcome};
pub use services::{Persistable, ResultsPersister};
pub use storage::{open_store, DocumentStore, FilestoreDocumentStore, MemoryDocumentStore};
