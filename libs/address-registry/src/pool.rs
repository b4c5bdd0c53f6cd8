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
//! The service VIP address pool.

use core::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

/// Pool configuration errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The configured service CIDR does not parse.
    #[error("invalid service CIDR '{cidr}'")]
    InvalidCidr {
        /// The offending configuration value.
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },
}

/// The pool of virtual IP addresses available to load-balancer services.
///
/// The pool is a pure view over one IPv4 prefix: it holds no allocation
/// state and recomputes the usable host sequence on demand. The sequence is
/// strictly ascending, so "first free address" is stable across
/// reconciliations of different services racing for the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePool {
    prefix: Ipv4Net,
}

impl ServicePool {
    /// Creates a pool from a CIDR string, masked to its network base.
    ///
    /// A malformed CIDR is a deployment configuration error and fails the
    /// construction of the engine, not individual reconciliations.
    pub fn new(cidr: &str) -> Result<Self, PoolError> {
        let prefix: Ipv4Net = cidr.parse().map_err(|source| {
            PoolError::InvalidCidr {
                cidr: cidr.to_string(),
                source,
            }
        })?;
        Ok(Self {
            prefix: prefix.trunc(),
        })
    }

    /// The prefix this pool allocates from.
    pub fn prefix(&self) -> Ipv4Net {
        self.prefix
    }

    /// Iterates over the usable host addresses of the prefix in ascending
    /// order.
    ///
    /// The network and broadcast addresses are excluded; a /31 or /32
    /// prefix therefore yields an empty sequence, which callers treat as
    /// immediate exhaustion rather than an error.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let network = self.prefix.network().to_bits();
        let broadcast = self.prefix.broadcast().to_bits();
        // Saturating keeps the range empty for a /32 at the top of the
        // address space, where network + 1 would wrap.
        (network.saturating_add(1)..broadcast).map(Ipv4Addr::from_bits)
    }
}

impl fmt::Display for ServicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix)
    }
}
