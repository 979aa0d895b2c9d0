// Copyright 2025 Tenant Platform Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Load-balancing strategy engine.
//!
//! Selection is pure: given the eligible set it returns one instance and
//! touches nothing else. The connection-count side effect belongs to the
//! caller (route manager via the registry).

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ensure;

use crate::types::error::{self, Result};
use crate::types::instance::BackendInstance;
use crate::types::route::LoadBalanceStrategy;

/// Digest used by the ip_hash strategy.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Fnv1a,
}

impl HashAlgorithm {
    fn digest(&self, input: &str) -> u64 {
        match self {
            HashAlgorithm::Sha256 => {
                let hash = Sha256::digest(input.as_bytes());
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&hash[..8]);
                u64::from_be_bytes(bytes)
            }
            HashAlgorithm::Fnv1a => {
                let mut hash: u64 = 0xcbf29ce484222325;
                for byte in input.as_bytes() {
                    hash ^= u64::from(*byte);
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                hash
            }
        }
    }
}

pub struct LoadBalancer {
    /// Per-tenant rotating cursor for the round-robin strategy.
    cursors: DashMap<String, u64>,
    hash_algorithm: HashAlgorithm,
}

impl LoadBalancer {
    pub fn new(hash_algorithm: HashAlgorithm) -> Self {
        Self {
            cursors: DashMap::new(),
            hash_algorithm,
        }
    }

    /// Picks exactly one instance from the eligible set under the given
    /// strategy. `client_ip` feeds ip_hash; callers without a real client
    /// address pass `None` and get the placeholder hash.
    pub fn select<'a>(
        &self,
        tenant_id: &str,
        strategy: LoadBalanceStrategy,
        eligible: &'a [BackendInstance],
        client_ip: Option<&str>,
    ) -> Result<&'a BackendInstance> {
        ensure!(
            !eligible.is_empty(),
            error::NoHealthyBackendsSnafu {
                tenant_id: tenant_id.to_string()
            }
        );

        let inst = match strategy {
            LoadBalanceStrategy::RoundRobin => self.round_robin(tenant_id, eligible),
            LoadBalanceStrategy::LeastConn => Self::least_conn(eligible),
            LoadBalanceStrategy::Weighted => self.weighted(tenant_id, eligible),
            LoadBalanceStrategy::IpHash => self.ip_hash(eligible, client_ip),
            LoadBalanceStrategy::ResponseTime => self.response_time(tenant_id, eligible),
        };
        Ok(inst)
    }

    fn round_robin<'a>(
        &self,
        tenant_id: &str,
        eligible: &'a [BackendInstance],
    ) -> &'a BackendInstance {
        let mut cursor = self.cursors.entry(tenant_id.to_string()).or_insert(0);
        let index = (*cursor % eligible.len() as u64) as usize;
        *cursor = cursor.wrapping_add(1);
        &eligible[index]
    }

    fn least_conn(eligible: &[BackendInstance]) -> &BackendInstance {
        // Eligible sets are in creation order; strict less-than keeps the
        // oldest instance on ties.
        let mut best = &eligible[0];
        for inst in &eligible[1..] {
            if inst.current_connections < best.current_connections {
                best = inst;
            }
        }
        best
    }

    fn weighted<'a>(&self, tenant_id: &str, eligible: &'a [BackendInstance]) -> &'a BackendInstance {
        let total: u64 = eligible.iter().map(|i| u64::from(i.weight)).sum();
        if total == 0 {
            return self.round_robin(tenant_id, eligible);
        }

        // Draw from 1..=total so a zero-weight prefix can never satisfy
        // `cumulative >= draw`.
        let draw = rand::rng().random_range(1..=total);
        let mut cumulative = 0u64;
        for inst in eligible {
            cumulative += u64::from(inst.weight);
            if cumulative >= draw {
                return inst;
            }
        }
        &eligible[eligible.len() - 1]
    }

    fn ip_hash<'a>(
        &self,
        eligible: &'a [BackendInstance],
        client_ip: Option<&str>,
    ) -> &'a BackendInstance {
        // Real-client-IP plumbing is the transport layer's job; a missing
        // address degrades to a fixed placeholder rather than an error.
        let ip = client_ip.unwrap_or("0.0.0.0");
        let index = (self.hash_algorithm.digest(ip) % eligible.len() as u64) as usize;
        &eligible[index]
    }

    fn response_time<'a>(
        &self,
        tenant_id: &str,
        eligible: &'a [BackendInstance],
    ) -> &'a BackendInstance {
        let sampled = eligible
            .iter()
            .filter_map(|i| i.avg_response_time_ms.map(|ms| (i, ms)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match sampled {
            Some((inst, _)) => inst,
            // No samples yet: fall back to round-robin.
            None => self.round_robin(tenant_id, eligible),
        }
    }
}
