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
//! End-to-end reconciliation against an in-memory compare-and-swap store.

use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    str::FromStr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use keepalived_vip_reconciler::{
    reconciler::{Outcome, Reconciler, Request, Service},
    store::{Document, DocumentStore, StoreError},
};
use test_log::test;

/// In-memory document store with the semantics the engine expects from the
/// real cluster store: `persist` succeeds only if the caller's revision
/// matches the stored one, and every successful write bumps the revision.
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Mutex<StoredDocument>>,
}

#[derive(Default)]
struct StoredDocument {
    registry: Option<String>,
    owners: BTreeMap<String, String>,
    revision: u64,
}

impl MemoryStore {
    fn revision(&self) -> u64 {
        self.inner.lock().unwrap().revision
    }

    fn registry(&self) -> Option<String> {
        self.inner.lock().unwrap().registry.clone()
    }

    fn owners(&self) -> BTreeMap<String, String> {
        self.inner.lock().unwrap().owners.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch(&self) -> Result<Document, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(Document {
            registry: inner.registry.clone(),
            owners: inner.owners.clone(),
            revision: Some(inner.revision.to_string()),
        })
    }

    async fn persist(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if document.revision != Some(inner.revision.to_string()) {
            return Err(StoreError::Conflict);
        }
        inner.registry = document.registry;
        inner.owners = document.owners;
        inner.revision += 1;
        Ok(())
    }
}

fn service(uid: &str) -> Service {
    Service {
        uid: uid.to_string(),
        namespace: "default".to_string(),
        name: format!("svc-{uid}"),
        requested_ip: None,
    }
}

fn reconciler(store: &MemoryStore) -> Reconciler<MemoryStore> {
    Reconciler::new(store.clone(), "10.0.0.0/8").expect("valid CIDR")
}

fn ip(s: &str) -> Ipv4Addr {
    Ipv4Addr::from_str(s).unwrap()
}

#[test(tokio::test)]
async fn should_walk_a_service_through_its_lifecycle() {
    let store = MemoryStore::default();
    let reconciler = reconciler(&store);

    // Unbound at first.
    let outcome = reconciler
        .reconcile(Request::Query(service("a")))
        .await
        .expect("query");
    assert_eq!(outcome, Outcome::Unbound);

    // Ensure binds the first usable address of the pool.
    let endpoint = reconciler.ensure(service("a")).await.expect("ensure");
    assert_eq!(endpoint.ip, ip("10.0.0.1"));
    assert_eq!(
        store.registry().as_deref(),
        Some(r#"{"services":[{"uid":"a","ip":"10.0.0.1"}]}"#),
        "stored registry must keep the wire shape of existing documents"
    );
    assert_eq!(
        store.owners().get("10.0.0.1").map(String::as_str),
        Some("default/svc-a")
    );

    // Bound now.
    let bound = reconciler.query(service("a")).await.expect("query");
    assert_eq!(bound.map(|e| e.ip), Some(ip("10.0.0.1")));

    // Delete releases the binding and the owner side-entry.
    reconciler.delete(service("a")).await.expect("delete");
    let unbound = reconciler.query(service("a")).await.expect("query");
    assert_eq!(unbound, None);
    assert!(store.owners().is_empty());

    // Deleting again is a no-op that performs no write.
    let revision = store.revision();
    reconciler.delete(service("a")).await.expect("idempotent delete");
    assert_eq!(store.revision(), revision, "no-op delete must not write");
}

#[test(tokio::test)]
async fn should_assign_addresses_in_ascending_order_and_reuse_freed_ones() {
    let store = MemoryStore::default();
    let reconciler = reconciler(&store);

    let a = reconciler.ensure(service("a")).await.expect("ensure a");
    let b = reconciler.ensure(service("b")).await.expect("ensure b");
    let c = reconciler.ensure(service("c")).await.expect("ensure c");
    assert_eq!(
        (a.ip, b.ip, c.ip),
        (ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3"))
    );

    // Freeing the lowest address makes it the next allocation again.
    reconciler.delete(service("b")).await.expect("delete b");
    let d = reconciler.ensure(service("d")).await.expect("ensure d");
    assert_eq!(d.ip, ip("10.0.0.2"));
}

#[test(tokio::test)]
async fn should_converge_without_writing_on_repeated_ensure() {
    let store = MemoryStore::default();
    let reconciler = reconciler(&store);

    let first = reconciler.ensure(service("a")).await.expect("ensure");
    let revision = store.revision();

    let second = reconciler.ensure(service("a")).await.expect("ensure again");
    assert_eq!(first, second, "repeated ensure must return the same address");
    assert_eq!(store.revision(), revision, "fast path must not write");
}

#[test(tokio::test)]
async fn should_honor_an_operator_pin_and_release_the_old_owner_entry() {
    let store = MemoryStore::default();
    let reconciler = reconciler(&store);

    reconciler.ensure(service("a")).await.expect("ensure");

    let pinned = Service {
        requested_ip: Some("192.168.7.7".to_string()),
        ..service("a")
    };
    let endpoint = reconciler.ensure(pinned).await.expect("rebind to pin");
    assert_eq!(endpoint.ip, ip("192.168.7.7"));

    let owners = store.owners();
    assert!(!owners.contains_key("10.0.0.1"), "stale owner entry left behind");
    assert_eq!(
        owners.get("192.168.7.7").map(String::as_str),
        Some("default/svc-a")
    );
}

#[test(tokio::test)]
async fn should_reject_stale_writes_and_converge_on_rerun() {
    let store = MemoryStore::default();
    let reconciler = reconciler(&store);

    // A racing reconciliation reads the document...
    let stale = store.fetch().await.expect("fetch");

    // ...then this one wins the race and bumps the revision.
    reconciler.ensure(service("a")).await.expect("ensure a");

    // The stale write must be rejected, not merged.
    let err = store.persist(stale).await.expect_err("stale write");
    assert!(matches!(err, StoreError::Conflict), "got {err:?}");

    // The loser re-runs the whole reconciliation against a fresh fetch and
    // converges on the next free address.
    let endpoint = reconciler.ensure(service("b")).await.expect("rerun");
    assert_eq!(endpoint.ip, ip("10.0.0.2"));
}
