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

//! Instance registry: the authoritative in-process record of which backend
//! replicas exist per tenant.
//!
//! All mutation goes through the named update functions below; the
//! per-tenant map entry acts as the mutual-exclusion scope, so updates for
//! instances of one tenant are linearizable.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::types::instance::{BackendInstance, InstanceStatus, TenantStatus};

/// Aggregate counts for the health-status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryCounts {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<String, BTreeMap<String, BackendInstance>>,
    tenant_status: DashMap<String, TenantStatus>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica or refreshes its address and lifecycle state.
    /// Health flags and connection counts survive a refresh.
    pub fn upsert(&self, instance: BackendInstance) {
        let mut tenant = self
            .instances
            .entry(instance.tenant_id.clone())
            .or_default();
        match tenant.get_mut(&instance.instance_id) {
            Some(existing) => {
                existing.host = instance.host;
                existing.port = instance.port;
                existing.status = instance.status;
                existing.weight = instance.weight;
                existing.max_connections = instance.max_connections;
            }
            None => {
                tenant.insert(instance.instance_id.clone(), instance);
            }
        }
    }

    pub fn remove_instance(&self, tenant_id: &str, instance_id: &str) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            tenant.remove(instance_id);
        }
    }

    /// Purges everything known about a tenant (workload deletion).
    pub fn remove_tenant(&self, tenant_id: &str) {
        self.instances.remove(tenant_id);
        self.tenant_status.remove(tenant_id);
    }

    /// Drops replicas the platform no longer reports, returning their ids
    /// so the caller can also forget breaker state.
    pub fn retain_instances(&self, tenant_id: &str, live_ids: &[String]) -> Vec<String> {
        let mut dropped = Vec::new();
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            tenant.retain(|id, _| {
                if live_ids.iter().any(|l| l == id) {
                    true
                } else {
                    dropped.push(id.clone());
                    false
                }
            });
        }
        dropped
    }

    pub fn tenants(&self) -> Vec<String> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of a tenant's replicas in creation order.
    pub fn snapshot(&self, tenant_id: &str) -> Vec<BackendInstance> {
        let mut out: Vec<BackendInstance> = self
            .instances
            .get(tenant_id)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    /// Replicas passing the full eligibility invariant:
    /// running, healthy, circuit not open, under the connection cap.
    pub fn eligible(&self, tenant_id: &str, breaker: &CircuitBreaker) -> Vec<BackendInstance> {
        self.snapshot(tenant_id)
            .into_iter()
            .filter(|i| {
                i.status == InstanceStatus::Running
                    && i.is_healthy
                    && i.has_capacity()
                    && breaker.state(&i.instance_id) != CircuitState::Open
            })
            .collect()
    }

    pub fn mark_healthy(&self, tenant_id: &str, instance_id: &str, response_time_ms: Option<f64>) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                inst.is_healthy = true;
                inst.consecutive_failures = 0;
                inst.last_health_check = Some(Utc::now());
                if response_time_ms.is_some() {
                    inst.avg_response_time_ms = response_time_ms;
                }
            }
        }
    }

    pub fn mark_unhealthy(&self, tenant_id: &str, instance_id: &str) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                inst.is_healthy = false;
                inst.consecutive_failures += 1;
                inst.last_health_check = Some(Utc::now());
            }
        }
    }

    pub fn set_status(&self, tenant_id: &str, instance_id: &str, status: InstanceStatus) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                inst.status = status;
            }
        }
    }

    /// Increments the in-flight connection count; false when the replica
    /// is already at its cap (the selection is then invalid).
    pub fn acquire_connection(&self, tenant_id: &str, instance_id: &str) -> bool {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                if inst.current_connections < inst.max_connections {
                    inst.current_connections += 1;
                    return true;
                }
            }
        }
        false
    }

    pub fn release_connection(&self, tenant_id: &str, instance_id: &str) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                inst.current_connections = inst.current_connections.saturating_sub(1);
            }
        }
    }

    pub fn record_response_time(&self, tenant_id: &str, instance_id: &str, ms: f64) {
        if let Some(mut tenant) = self.instances.get_mut(tenant_id) {
            if let Some(inst) = tenant.get_mut(instance_id) {
                inst.avg_response_time_ms = Some(ms);
            }
        }
    }

    pub fn tenant_status(&self, tenant_id: &str) -> TenantStatus {
        self.tenant_status
            .get(tenant_id)
            .map(|s| *s)
            .unwrap_or_default()
    }

    pub fn set_tenant_status(&self, tenant_id: &str, status: TenantStatus) {
        self.tenant_status.insert(tenant_id.to_string(), status);
    }

    pub fn counts(&self) -> RegistryCounts {
        let mut counts = RegistryCounts::default();
        for tenant in self.instances.iter() {
            for inst in tenant.values() {
                counts.total += 1;
                if inst.is_healthy {
                    counts.healthy += 1;
                } else {
                    counts.unhealthy += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry_with(tenant: &str, ids: &[&str]) -> InstanceRegistry {
        let reg = InstanceRegistry::new();
        for (i, id) in ids.iter().enumerate() {
            reg.upsert(BackendInstance::new(
                tenant,
                id,
                &format!("10.0.0.{}", i + 1),
                8080,
            ));
        }
        reg
    }

    #[test]
    fn test_upsert_preserves_health_and_connections() {
        let reg = registry_with("t1", &["a"]);
        reg.mark_unhealthy("t1", "a");
        assert!(reg.acquire_connection("t1", "a"));

        // Re-discovery of the same replica at a new address.
        reg.upsert(BackendInstance::new("t1", "a", "10.0.9.9", 9090));

        let snap = reg.snapshot("t1");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].host, "10.0.9.9");
        assert_eq!(snap[0].port, 9090);
        assert!(!snap[0].is_healthy);
        assert_eq!(snap[0].current_connections, 1);
    }

    #[test]
    fn test_eligibility_invariant() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let reg = registry_with("t1", &["a", "b", "c", "d"]);

        reg.mark_unhealthy("t1", "a");
        reg.set_status("t1", "b", InstanceStatus::Stopping);
        breaker.record_failure("c"); // threshold 1: trips open

        let eligible = reg.eligible("t1", &breaker);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].instance_id, "d");
    }

    #[test]
    fn test_connection_cap_excludes_instance() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        let reg = InstanceRegistry::new();
        let mut inst = BackendInstance::new("t1", "a", "10.0.0.1", 8080);
        inst.max_connections = 1;
        reg.upsert(inst);

        assert!(reg.acquire_connection("t1", "a"));
        assert!(!reg.acquire_connection("t1", "a"));
        assert!(reg.eligible("t1", &breaker).is_empty());

        reg.release_connection("t1", "a");
        assert_eq!(reg.eligible("t1", &breaker).len(), 1);
    }

    #[test]
    fn test_retain_instances_reports_dropped() {
        let reg = registry_with("t1", &["a", "b", "c"]);
        let dropped = reg.retain_instances("t1", &["a".to_string(), "c".to_string()]);
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(reg.snapshot("t1").len(), 2);
    }

    #[test]
    fn test_counts() {
        let reg = registry_with("t1", &["a", "b"]);
        reg.mark_unhealthy("t1", "b");
        let counts = reg.counts();
        assert_eq!(
            counts,
            RegistryCounts {
                total: 2,
                healthy: 1,
                unhealthy: 1
            }
        );
    }

    #[test]
    fn test_remove_tenant_purges_status() {
        let reg = registry_with("t1", &["a"]);
        reg.set_tenant_status("t1", TenantStatus::Error);
        reg.remove_tenant("t1");
        assert!(reg.snapshot("t1").is_empty());
        assert_eq!(reg.tenant_status("t1"), TenantStatus::Creating);
    }
}
