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
//! The per-service reconciliation state machine.

use std::net::Ipv4Addr;

use keepalived_vip_registry::{
    pool::{PoolError, ServicePool},
    registry::{AllocationError, Registry, ServiceBinding},
};
use thiserror::Error;

use crate::store::{DocumentStore, StoreError};

/// Reconciliation errors.
///
/// Validation and allocation failures are terminal for the attempt and must
/// stay distinguishable from store failures, so the outer framework can
/// decide what is worth retrying.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The explicitly requested address does not parse. Rejected per call.
    #[error("invalid requested address '{address}'")]
    InvalidAddress {
        /// The offending request value.
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    /// No free address left in the pool.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The binding registry carried by the shared document is corrupt.
    #[error("invalid binding registry in shared document: {0}")]
    InvalidRegistry(#[source] anyhow::Error),
    /// Fetch or persist against the document store failed. Propagated
    /// untouched; retry policy belongs to the surrounding framework.
    #[error("document store error: {0}")]
    Store(#[from] StoreError),
}

/// A load-balancer service as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Stable unique identifier of the service.
    pub uid: String,
    /// Namespace of the service, recorded in the owner side map.
    pub namespace: String,
    /// Name of the service, recorded in the owner side map.
    pub name: String,
    /// Explicitly requested address, if the operator pinned one. Arrives
    /// unvalidated and is checked per call.
    pub requested_ip: Option<String>,
}

impl Service {
    fn requested_address(&self) -> Result<Option<Ipv4Addr>, ReconcileError> {
        self.requested_ip
            .as_deref()
            .map(|raw| {
                raw.parse().map_err(|source| {
                    ReconcileError::InvalidAddress {
                        address: raw.to_string(),
                        source,
                    }
                })
            })
            .transpose()
    }

    fn owner(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A service lifecycle event, dispatched through [Reconciler::reconcile].
#[derive(Debug, Clone)]
pub enum Request {
    /// Converge the service onto an assigned address.
    Ensure(Service),
    /// Report the current binding without mutating anything.
    Query(Service),
    /// Release the service's binding and its owner side-entry.
    Delete(Service),
}

/// The result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The service is converged onto the contained endpoint.
    Ensured(Endpoint),
    /// The service currently holds the contained endpoint.
    Bound(Endpoint),
    /// The service holds no binding.
    Unbound,
    /// The service's binding is gone.
    Deleted,
}

/// An ensured load-balancer endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Stable unique identifier of the service.
    pub uid: String,
    /// The address assigned to the service.
    pub ip: Ipv4Addr,
}

/// Converges one service per call against the shared document.
///
/// The reconciler owns nothing but the parsed pool and the store handle: it
/// holds no locks, spawns no tasks and caches no registry state between
/// calls, so concurrent invocations by the surrounding framework are safe.
/// The document store's conditional update is the sole serialization point;
/// on [StoreError::Conflict] the caller re-runs the whole request so the
/// allocation decision is always made against an up-to-date registry.
pub struct Reconciler<S> {
    store: S,
    pool: ServicePool,
}

impl<S: DocumentStore> Reconciler<S> {
    /// Creates a reconciler allocating from the given service CIDR.
    ///
    /// A malformed CIDR is fatal here, not per call.
    pub fn new(store: S, service_cidr: &str) -> Result<Self, PoolError> {
        Ok(Self {
            store,
            pool: ServicePool::new(service_cidr)?,
        })
    }

    /// The pool this reconciler allocates from.
    pub fn pool(&self) -> &ServicePool {
        &self.pool
    }

    /// Dispatches one reconciliation request.
    ///
    /// Each request runs fetch, decode, mutate, encode and persist as one
    /// unit; no partial state is carried across calls.
    pub async fn reconcile(&self, request: Request) -> Result<Outcome, ReconcileError> {
        match request {
            Request::Ensure(service) => self.sync(service).await.map(Outcome::Ensured),
            Request::Query(service) => {
                Ok(match self.lookup(&service).await? {
                    Some(endpoint) => Outcome::Bound(endpoint),
                    None => Outcome::Unbound,
                })
            }
            Request::Delete(service) => self.release(service).await.map(|()| Outcome::Deleted),
        }
    }

    /// Ensures the service has an assigned address and returns the
    /// endpoint.
    pub async fn ensure(&self, service: Service) -> Result<Endpoint, ReconcileError> {
        self.sync(service).await
    }

    /// Reports the service's current binding without mutating anything.
    pub async fn query(&self, service: Service) -> Result<Option<Endpoint>, ReconcileError> {
        self.lookup(&service).await
    }

    /// Releases the service's binding; a no-op if it is already unbound.
    pub async fn delete(&self, service: Service) -> Result<(), ReconcileError> {
        self.release(service).await
    }

    async fn sync(&self, service: Service) -> Result<Endpoint, ReconcileError> {
        tracing::info!("syncing service '{}' ({})", service.name, service.uid);

        let requested = service.requested_address()?;

        let mut document = self.store.fetch().await?;
        let mut registry = Registry::decode(document.registry.as_deref())
            .map_err(ReconcileError::InvalidRegistry)?;

        let existing = registry.lookup(&service.uid).cloned();
        if let Some(ref binding) = existing {
            // Already converged unless the operator pinned a different
            // address; the fast path performs no write.
            if requested.is_none() || requested == Some(binding.ip) {
                tracing::info!(
                    "found existing load balancer for service '{}' ({}) with IP {}",
                    service.name,
                    service.uid,
                    binding.ip
                );
                return Ok(Endpoint {
                    uid: binding.uid.clone(),
                    ip: binding.ip,
                });
            }
        }

        let ip = match requested {
            // An operator pin is used verbatim; it may lie outside the pool.
            Some(ip) => ip,
            None => registry.first_free(&self.pool)?,
        };

        registry.ensure(ServiceBinding {
            uid: service.uid.clone(),
            ip,
        });

        // Keep the owner side map in step with the binding.
        if let Some(previous) = existing {
            if previous.ip != ip {
                document.owners.remove(&previous.ip.to_string());
            }
        }
        document.owners.insert(ip.to_string(), service.owner());
        document.registry = Some(registry.encode().map_err(ReconcileError::InvalidRegistry)?);

        self.store.persist(document).await?;
        tracing::info!("synced service '{}' ({}): {}", service.name, service.uid, ip);

        Ok(Endpoint {
            uid: service.uid,
            ip,
        })
    }

    async fn lookup(&self, service: &Service) -> Result<Option<Endpoint>, ReconcileError> {
        let document = self.store.fetch().await?;
        let registry = Registry::decode(document.registry.as_deref())
            .map_err(ReconcileError::InvalidRegistry)?;

        Ok(registry.lookup(&service.uid).map(|binding| {
            Endpoint {
                uid: binding.uid.clone(),
                ip: binding.ip,
            }
        }))
    }

    async fn release(&self, service: Service) -> Result<(), ReconcileError> {
        tracing::info!("ensuring service '{}' ({}) is deleted", service.name, service.uid);

        let mut document = self.store.fetch().await?;
        let mut registry = Registry::decode(document.registry.as_deref())
            .map_err(ReconcileError::InvalidRegistry)?;

        let Some(removed) = registry.remove(&service.uid) else {
            // Already unbound; deletion is idempotent and writes nothing.
            return Ok(());
        };

        document.owners.remove(&removed.ip.to_string());
        document.registry = Some(registry.encode().map_err(ReconcileError::InvalidRegistry)?);

        self.store.persist(document).await?;
        tracing::info!(
            "released address {} of service '{}' ({})",
            removed.ip,
            service.name,
            service.uid
        );

        Ok(())
    }
}
