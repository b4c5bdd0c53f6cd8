// Copyright 2026 The keepalived-vip Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! The shared-document store seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// The shared document acting as the system's single source of truth.
///
/// In a cluster deployment this is the config object consumed by the
/// keepalived daemons; the engine only reads and writes the pieces below
/// and the store adapter is responsible for carrying every other field of
/// the underlying object through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// The serialized binding registry.
    pub registry: Option<String>,
    /// Side map from address to `namespace/name` of the owning service.
    /// Kept for operators debugging address ownership; never read back by
    /// the engine.
    pub owners: BTreeMap<String, String>,
    /// Opaque revision the store uses for conditional updates.
    pub revision: Option<String>,
}

/// Document store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The shared document does not exist.
    #[error("shared document not found")]
    NotFound,
    /// The document changed since it was read. Recoverable by re-running
    /// the whole reconciliation against a fresh fetch, never by retrying
    /// the stale write.
    #[error("conflicting concurrent update to the shared document")]
    Conflict,
    /// Transport or availability failure of the store.
    #[error("document store I/O error: {0}")]
    Io(#[source] anyhow::Error),
}

/// Fetch and conditionally update the shared document.
///
/// Implementations are scoped to one document key, fixed at construction.
/// `persist` MUST be a compare-and-swap on [Document::revision] and fail
/// with [StoreError::Conflict] when the document moved underneath the
/// writer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches the current document.
    async fn fetch(&self) -> Result<Document, StoreError>;

    /// Persists the document if it is unchanged since it was fetched.
    async fn persist(&self, document: Document) -> Result<(), StoreError>;
}
