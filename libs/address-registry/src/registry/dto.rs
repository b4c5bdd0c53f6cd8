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
//! Data transfer objects (DTOs) for the binding registry.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::registry::{Registry, ServiceBinding};

/// Serialized shape of the binding registry.
///
/// This is the literal JSON stored in the shared document's registry field
/// and must stay byte-compatible with documents written by existing
/// deployments. Absent and `null` service lists both decode to the empty
/// registry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct RegistryDto {
    /// The list of service bindings.
    #[serde(default)]
    pub services: Option<Vec<ServiceBindingDto>>,
}

/// A single service binding.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct ServiceBindingDto {
    /// Stable unique identifier of the service.
    pub uid: String,
    /// The assigned address in dotted-quad notation.
    pub ip: String,
}

impl From<&Registry> for RegistryDto {
    fn from(registry: &Registry) -> Self {
        RegistryDto {
            services: Some(registry.bindings().iter().map(ServiceBindingDto::from).collect()),
        }
    }
}

impl TryFrom<RegistryDto> for Registry {
    type Error = anyhow::Error;

    fn try_from(value: RegistryDto) -> Result<Self, Self::Error> {
        let bindings = value
            .services
            .unwrap_or_default()
            .into_iter()
            .map(ServiceBinding::try_from)
            .collect::<Result<_, Self::Error>>()?;
        Ok(Registry { bindings })
    }
}

impl From<&ServiceBinding> for ServiceBindingDto {
    fn from(binding: &ServiceBinding) -> Self {
        ServiceBindingDto {
            uid: binding.uid.clone(),
            ip: binding.ip.to_string(),
        }
    }
}

impl TryFrom<ServiceBindingDto> for ServiceBinding {
    type Error = anyhow::Error;

    fn try_from(value: ServiceBindingDto) -> Result<Self, Self::Error> {
        Ok(Self {
            ip: value
                .ip
                .parse()
                .with_context(|| format!("invalid address '{}' for service '{}'", value.ip, value.uid))?,
            uid: value.uid,
        })
    }
}
