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
//! # keepalived VIP reconciler
//!
//! Converges load-balancer services onto virtual IP addresses recorded in a
//! shared cluster document. The [reconciler::Reconciler] is the single entry
//! point the surrounding controller framework drives; the document store
//! behind [store::DocumentStore] provides the conditional update that
//! serializes reconciliations racing on the same document.
//!
//! The engine owns no state. Every call fetches the document, decodes a
//! fresh binding registry, mutates that copy and writes it back; a
//! [store::StoreError::Conflict] from the write means another reconciliation
//! won the race and the whole request must be re-run from a fresh fetch.

pub mod reconciler;
pub mod store;
