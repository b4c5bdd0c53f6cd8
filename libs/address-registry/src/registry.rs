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
//! Service-to-VIP binding registry.

use std::net::Ipv4Addr;

use anyhow::Context;
use thiserror::Error;

use crate::pool::ServicePool;

pub(crate) mod dto;

/// Address allocation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// Every usable address of the pool is claimed by a binding. Requires
    /// operator action: enlarge the service CIDR or remove load balancers.
    #[error("service CIDR pool exhausted; increase the size of the CIDR or remove some load balancers")]
    PoolExhausted,
}

/// The durable association between a service and its assigned address.
///
/// The service UID is the binding's primary key; the address is the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    /// Stable unique identifier of the service.
    pub uid: String,
    /// The address assigned to the service.
    pub ip: Ipv4Addr,
}

/// The ordered collection of current service bindings.
///
/// Invariants: at most one binding per service UID, and an address is
/// claimed by at most one binding. The registry has no life of its own; it
/// is decoded from the shared document at the start of a reconciliation,
/// mutated in place and written back at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    bindings: Vec<ServiceBinding>,
}

impl Registry {
    /// Decodes a registry from the shared document's registry field.
    ///
    /// A missing field is not an error: documents that never saw a binding
    /// decode to the empty registry.
    pub fn decode(field: Option<&str>) -> anyhow::Result<Self> {
        let Some(raw) = field else {
            return Ok(Self::default());
        };
        let decoded: dto::RegistryDto =
            serde_json::from_str(raw).context("error decoding binding registry from document")?;
        decoded.try_into()
    }

    /// Encodes the registry into the serialized form stored in the shared
    /// document.
    pub fn encode(&self) -> anyhow::Result<String> {
        serde_json::to_string(&dto::RegistryDto::from(self))
            .context("error encoding binding registry")
    }

    /// Returns the existing binding for a service, if any.
    pub fn lookup(&self, uid: &str) -> Option<&ServiceBinding> {
        self.bindings.iter().find(|binding| binding.uid == uid)
    }

    /// Inserts the binding, replacing an existing binding with the same
    /// service UID in place.
    ///
    /// Replacement preserves the registry's ordering of the other entries,
    /// and applying the same binding twice leaves the registry unchanged.
    pub fn ensure(&mut self, binding: ServiceBinding) {
        if let Some(existing) = self
            .bindings
            .iter_mut()
            .find(|existing| existing.uid == binding.uid)
        {
            tracing::info!(
                "updating binding for service '{}': {} -> {}",
                binding.uid,
                existing.ip,
                binding.ip
            );
            *existing = binding;
            return;
        }

        tracing::info!("adding binding for service '{}': {}", binding.uid, binding.ip);
        self.bindings.push(binding);
        tracing::debug!("registry now holds {} bindings", self.bindings.len());
    }

    /// Removes the binding for a service and returns it.
    ///
    /// Removal of an absent service is a no-op; deletion must never fail
    /// merely because the entry is already gone.
    pub fn remove(&mut self, uid: &str) -> Option<ServiceBinding> {
        let index = self.bindings.iter().position(|binding| binding.uid == uid)?;
        let removed = self.bindings.remove(index);
        tracing::info!(
            "removed binding for service '{}' ({})",
            removed.uid,
            removed.ip
        );
        Some(removed)
    }

    /// Whether any binding claims the given address.
    pub fn is_claimed(&self, ip: Ipv4Addr) -> bool {
        self.bindings.iter().any(|binding| binding.ip == ip)
    }

    /// Picks the lowest-ordered pool address not claimed by any binding.
    ///
    /// The lowest-first tie-break is deliberate: together with the pool's
    /// ascending enumeration it makes allocation deterministic and
    /// reproducible.
    pub fn first_free(&self, pool: &ServicePool) -> Result<Ipv4Addr, AllocationError> {
        pool.addresses()
            .find(|candidate| !self.is_claimed(*candidate))
            .ok_or(AllocationError::PoolExhausted)
    }

    /// The current bindings, in registry order.
    pub fn bindings(&self) -> &[ServiceBinding] {
        &self.bindings
    }

    /// The number of bindings in the registry.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
