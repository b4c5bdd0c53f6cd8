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
//! # Service VIP registry
//!
//! Building blocks for load-balancer VIP assignment: [pool::ServicePool]
//! enumerates the usable addresses of the configured service CIDR, and
//! [registry::Registry] tracks which service owns which address and picks
//! the next free address when a new one is needed.
//!
//! Both are pure views over their inputs. The registry is decoded from the
//! shared cluster document at the start of every reconciliation and written
//! back at the end; nothing here survives between calls.

pub mod pool;
pub mod registry;
