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

//! Route manager: the single entry point for resolving tenant routes and
//! driving workload lifecycle.
//!
//! Resolution order is cache, then platform discovery, then provisioning.
//! A tenant without a service gets its workload provisioned exactly once
//! per window no matter how many requests hit the miss concurrently.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use snafu::ensure;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::balancer::LoadBalancer;
use crate::breaker::CircuitBreaker;
use crate::cache::{RouteCache, RouteCacheEntry};
use crate::config::GatewayConfig;
use crate::metrics::MetricsStore;
use crate::platform::{Platform, ServiceInfo, WorkloadSpec, workload};
use crate::registry::InstanceRegistry;
use crate::types::error::{self, Result};
use crate::types::instance::{BackendInstance, InstanceStatus, TenantStatus};
use crate::types::record::ErrorKind;
use crate::types::route::{LoadBalanceStrategy, TenantRoute};

/// A second provisioning attempt for the same tenant is suppressed for
/// this long after the first was started.
const PROVISIONING_WINDOW: Duration = Duration::from_secs(60);

/// A successfully resolved target for one request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRoute {
    pub tenant_id: String,
    pub target_url: String,
    /// `None` when the request was resolved to the service-level target
    /// because no replica has registered yet.
    pub instance_id: Option<String>,
    pub strategy: LoadBalanceStrategy,
    pub cache_hit: bool,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum Resolution {
    Ready(ResolvedRoute),
    /// Workload provisioning has been kicked off; the caller should retry.
    Creating,
}

pub struct RouteManager<P> {
    platform: P,
    config: GatewayConfig,
    registry: Arc<InstanceRegistry>,
    cache: Arc<RouteCache>,
    breaker: Arc<CircuitBreaker>,
    balancer: LoadBalancer,
    metrics: Arc<MetricsStore>,
    routes: DashMap<String, TenantRoute>,
    /// Tenants with a provisioning task in flight, keyed to its start.
    provisioning: DashMap<String, Instant>,
    /// Self-handle for spawning background provisioning tasks.
    weak: Weak<Self>,
}

impl<P: Platform> RouteManager<P> {
    pub fn new(platform: P, config: GatewayConfig) -> Arc<Self> {
        let breaker = Arc::new(CircuitBreaker::new(
            config.failure_threshold,
            config.recovery_timeout(),
        ));
        Arc::new_cyclic(|weak| Self {
            platform,
            registry: Arc::new(InstanceRegistry::new()),
            cache: Arc::new(RouteCache::new()),
            breaker,
            balancer: LoadBalancer::new(config.ip_hash_algorithm),
            metrics: Arc::new(MetricsStore::new()),
            routes: DashMap::new(),
            provisioning: DashMap::new(),
            weak: weak.clone(),
            config,
        })
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<RouteCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.metrics
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn platform(&self) -> &P {
        &self.platform
    }

    /// Resolves the backend target for one request.
    ///
    /// On a cache miss the tenant's service is discovered through the
    /// platform and its endpoints synced into the registry. A tenant with
    /// no service at all gets its workload provisioned in the background
    /// and the caller sees [`Resolution::Creating`].
    pub async fn resolve(&self, tenant_id: &str, client_ip: Option<&str>) -> Result<Resolution> {
        let route = self.route_entry(tenant_id);
        ensure!(
            route.is_active,
            error::RouteInactiveSnafu {
                tenant_id: tenant_id.to_string()
            }
        );

        let (service, cache_hit) = match self.cache.get(tenant_id) {
            Some(entry) => (entry.service, true),
            None => match self.platform.get_service(tenant_id).await? {
                Some(service) => {
                    self.sync_endpoints(tenant_id).await?;
                    let target = service_target(&service);
                    self.cache.insert(
                        tenant_id,
                        RouteCacheEntry::new(target, service.clone(), self.config.route_cache_ttl()),
                    );
                    (service, false)
                }
                None => {
                    self.begin_provisioning(tenant_id);
                    return Ok(Resolution::Creating);
                }
            },
        };

        let mut candidates = self.registry.eligible(tenant_id, &self.breaker);
        let resolved = if candidates.is_empty() && self.registry.snapshot(tenant_id).is_empty() {
            // No replica has registered yet; the service-level target
            // still routes through the cluster network.
            ResolvedRoute {
                tenant_id: tenant_id.to_string(),
                target_url: service_target(&service),
                instance_id: None,
                strategy: route.strategy,
                cache_hit,
            }
        } else {
            loop {
                if candidates.is_empty() {
                    return Err(self.no_usable_backend(tenant_id));
                }
                let picked = self
                    .balancer
                    .select(tenant_id, route.strategy, &candidates, client_ip)?
                    .clone();
                // The eligible set is a snapshot; the cap may have been
                // hit since.
                if !self.registry.acquire_connection(tenant_id, &picked.instance_id) {
                    candidates.retain(|i| i.instance_id != picked.instance_id);
                    continue;
                }
                // Claim admission last: in half-open only one trial
                // request may be outstanding per instance.
                if !self.breaker.allow(&picked.instance_id) {
                    self.registry
                        .release_connection(tenant_id, &picked.instance_id);
                    candidates.retain(|i| i.instance_id != picked.instance_id);
                    continue;
                }
                break ResolvedRoute {
                    tenant_id: tenant_id.to_string(),
                    target_url: picked.url(),
                    instance_id: Some(picked.instance_id.clone()),
                    strategy: route.strategy,
                    cache_hit,
                };
            }
        };

        if let Some(mut r) = self.routes.get_mut(tenant_id) {
            r.last_route_time = Some(Utc::now());
        }
        Ok(Resolution::Ready(resolved))
    }

    /// Classifies an exhausted selection. When a replica that would
    /// otherwise serve traffic is excluded only by its breaker, the caller
    /// gets `CircuitOpen` with the soonest recovery hint; anything else is
    /// `NoHealthyBackends`.
    fn no_usable_backend(&self, tenant_id: &str) -> error::Error {
        self.metrics
            .record_request(tenant_id, 0.0, false, Some(ErrorKind::Gateway));
        let soonest = self
            .registry
            .snapshot(tenant_id)
            .into_iter()
            .filter(|i| i.status == InstanceStatus::Running && i.is_healthy && i.has_capacity())
            .filter_map(|i| {
                self.breaker
                    .retry_after(&i.instance_id)
                    .map(|after| (i.instance_id, after))
            })
            .min_by_key(|(_, after)| *after);
        match soonest {
            Some((instance_id, retry_after)) => error::Error::CircuitOpen {
                instance_id,
                retry_after,
            },
            None => error::Error::NoHealthyBackends {
                tenant_id: tenant_id.to_string(),
            },
        }
    }

    /// Called when a routed request finishes. Releases the connection slot
    /// and feeds breaker and metrics.
    pub fn complete_request(
        &self,
        tenant_id: &str,
        instance_id: &str,
        response_time_ms: f64,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) {
        self.registry.release_connection(tenant_id, instance_id);
        self.registry
            .record_response_time(tenant_id, instance_id, response_time_ms);
        if success {
            self.breaker.record_success(instance_id);
        } else {
            self.breaker.record_failure(instance_id);
        }
        self.metrics
            .record_request(tenant_id, response_time_ms, success, error_kind);
    }

    /// Provisions the full workload for a tenant: deployment, then
    /// service, then autoscaler. Idempotent end to end.
    pub async fn create_tenant_workload(&self, tenant_id: &str) -> Result<()> {
        info!("provisioning backend workload for tenant {}", tenant_id);
        self.registry
            .set_tenant_status(tenant_id, TenantStatus::Creating);

        let spec = WorkloadSpec::from_config(&self.config);
        self.platform.create_deployment(tenant_id, &spec).await?;
        self.platform.create_service(tenant_id, &spec).await?;
        self.platform.create_autoscaler(tenant_id, &spec).await?;

        self.cache.invalidate(tenant_id);
        if let Some(mut route) = self.routes.get_mut(tenant_id) {
            route.is_active = true;
        } else {
            self.route_entry(tenant_id);
        }
        Ok(())
    }

    /// Tears the workload down in reverse order: autoscaler, service,
    /// deployment. Registry and cache state for the tenant is purged; the
    /// route record survives, deactivated.
    pub async fn delete_tenant_workload(&self, tenant_id: &str) -> Result<()> {
        info!("deleting backend workload for tenant {}", tenant_id);
        self.registry
            .set_tenant_status(tenant_id, TenantStatus::Terminating);

        self.platform.delete_autoscaler(tenant_id).await?;
        self.platform.delete_service(tenant_id).await?;
        self.platform.delete_deployment(tenant_id).await?;

        for inst in self.registry.snapshot(tenant_id) {
            self.breaker.forget(&inst.instance_id);
        }
        self.registry.remove_tenant(tenant_id);
        self.cache.invalidate(tenant_id);
        self.provisioning.remove(tenant_id);
        if let Some(mut route) = self.routes.get_mut(tenant_id) {
            route.is_active = false;
        }
        Ok(())
    }

    pub async fn scale_tenant_workload(&self, tenant_id: &str, replicas: i32) -> Result<()> {
        self.platform.scale_deployment(tenant_id, replicas).await?;
        // The replica set is about to change; do not serve the old target.
        self.cache.invalidate(tenant_id);
        Ok(())
    }

    /// Pulls the current endpoint set from the platform into the registry,
    /// dropping replicas the platform no longer reports.
    pub async fn sync_endpoints(&self, tenant_id: &str) -> Result<()> {
        let addresses = self.platform.get_endpoints(tenant_id).await?;
        let mut live_ids = Vec::with_capacity(addresses.len());
        for addr in &addresses {
            let id = addr.instance_id();
            self.registry
                .upsert(BackendInstance::new(tenant_id, &id, &addr.ip, addr.port));
            live_ids.push(id);
        }
        for dropped in self.registry.retain_instances(tenant_id, &live_ids) {
            self.breaker.forget(&dropped);
        }
        if !addresses.is_empty() {
            self.registry
                .set_tenant_status(tenant_id, TenantStatus::Running);
        }
        Ok(())
    }

    /// Direct registration path for backends that announce themselves.
    pub fn register_instance(&self, instance: BackendInstance) {
        let tenant_id = instance.tenant_id.clone();
        self.registry.upsert(instance);
        self.registry
            .set_tenant_status(&tenant_id, TenantStatus::Running);
    }

    pub fn remove_instance(&self, tenant_id: &str, instance_id: &str) {
        self.registry.remove_instance(tenant_id, instance_id);
        self.breaker.forget(instance_id);
    }

    /// Health report from a probe or an external watcher.
    pub fn report_instance_health(
        &self,
        tenant_id: &str,
        instance_id: &str,
        healthy: bool,
        response_time_ms: Option<f64>,
    ) {
        if healthy {
            self.registry
                .mark_healthy(tenant_id, instance_id, response_time_ms);
            self.breaker.record_success(instance_id);
        } else {
            self.registry.mark_unhealthy(tenant_id, instance_id);
            self.breaker.record_failure(instance_id);
        }
    }

    /// Tenants the health loop visits: every known route plus any tenant
    /// with registered replicas. A freshly discovered route whose
    /// endpoints have not been synced yet is still covered.
    pub fn health_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.routes.iter().map(|r| r.key().clone()).collect();
        for tenant_id in self.registry.tenants() {
            if !ids.contains(&tenant_id) {
                ids.push(tenant_id);
            }
        }
        ids
    }

    pub fn route(&self, tenant_id: &str) -> Option<TenantRoute> {
        self.routes.get(tenant_id).map(|r| r.clone())
    }

    pub fn set_strategy(&self, tenant_id: &str, strategy: LoadBalanceStrategy) {
        let mut route = self
            .routes
            .entry(tenant_id.to_string())
            .or_insert_with(|| self.new_route(tenant_id));
        route.strategy = strategy;
    }

    fn new_route(&self, tenant_id: &str) -> TenantRoute {
        TenantRoute::new(
            tenant_id,
            &workload::service_name(tenant_id),
            &self.config.namespace,
        )
    }

    fn route_entry(&self, tenant_id: &str) -> TenantRoute {
        self.routes
            .entry(tenant_id.to_string())
            .or_insert_with(|| self.new_route(tenant_id))
            .clone()
    }

    /// Starts background provisioning unless an attempt for this tenant is
    /// already in flight within the window.
    fn begin_provisioning(&self, tenant_id: &str) {
        let now = Instant::now();
        let fresh = match self.provisioning.entry(tenant_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) > PROVISIONING_WINDOW {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        };
        if !fresh {
            return;
        }

        // The manager lives in an Arc for the lifetime of the process; a
        // failed upgrade means shutdown is underway.
        let Some(manager) = self.weak.upgrade() else {
            self.provisioning.remove(tenant_id);
            return;
        };
        let tenant = tenant_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = manager.create_tenant_workload(&tenant).await {
                warn!("provisioning for tenant {} failed: {}", tenant, err);
                manager
                    .registry
                    .set_tenant_status(&tenant, TenantStatus::Error);
            }
            manager.provisioning.remove(&tenant);
        });
    }
}

fn service_target(service: &ServiceInfo) -> String {
    service.url().unwrap_or_else(|| {
        // Headless or pending service: fall back to the DNS name.
        format!("http://{}.{}.svc", service.name, service.namespace)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakePlatform, test_config};
    use crate::types::error::Error;

    fn manager(platform: FakePlatform) -> Arc<RouteManager<FakePlatform>> {
        RouteManager::new(platform, test_config())
    }

    #[tokio::test]
    async fn test_resolve_miss_provisions_and_reports_creating() {
        let mgr = manager(FakePlatform::default());

        let resolution = mgr.resolve("t1", None).await;
        assert!(matches!(resolution, Ok(Resolution::Creating)));

        // Wait for the spawned provisioning task to finish.
        for _ in 0..100 {
            if mgr.provisioning.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mgr.platform().create_deployment_calls(), 1);
        assert_eq!(
            mgr.platform().call_order(),
            vec!["create_deployment", "create_service", "create_autoscaler"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_misses_provision_once() {
        let mgr = manager(FakePlatform::default());

        let a = mgr.resolve("t1", None);
        let b = mgr.resolve("t1", None);
        let c = mgr.resolve("t1", None);
        let (a, b, c) = tokio::join!(a, b, c);
        for r in [a, b, c] {
            assert!(matches!(r, Ok(Resolution::Creating)));
        }

        for _ in 0..100 {
            if mgr.provisioning.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mgr.platform().create_deployment_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_selects_registered_instance() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);

        let resolution = mgr.resolve("t1", None).await;
        match resolution {
            Ok(Resolution::Ready(route)) => {
                assert_eq!(route.target_url, "http://10.0.0.1:8080");
                assert_eq!(route.instance_id.as_deref(), Some("t1-pod-0"));
                assert!(!route.cache_hit);
            }
            other => panic!("expected ready resolution, got {other:?}"),
        }
        // Connection slot was taken.
        let snap = mgr.registry().snapshot("t1");
        assert_eq!(snap[0].current_connections, 1);
    }

    #[tokio::test]
    async fn test_resolve_cache_hit_skips_discovery() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);

        let first = mgr.resolve("t1", None).await;
        assert!(matches!(first, Ok(Resolution::Ready(_))));
        let calls_after_first = mgr.platform().get_service_calls();

        let second = mgr.resolve("t1", None).await;
        match second {
            Ok(Resolution::Ready(route)) => assert!(route.cache_hit),
            other => panic!("expected ready resolution, got {other:?}"),
        }
        assert_eq!(mgr.platform().get_service_calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_resolve_without_replicas_uses_service_target() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        let mgr = manager(platform);

        match mgr.resolve("t1", None).await {
            Ok(Resolution::Ready(route)) => {
                assert_eq!(route.target_url, "http://10.96.0.5:80");
                assert!(route.instance_id.is_none());
            }
            other => panic!("expected ready resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_all_unhealthy_is_no_healthy_backends() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);

        // Register via discovery, then fail the only replica.
        let warmup = mgr.resolve("t1", None).await;
        assert!(matches!(warmup, Ok(Resolution::Ready(_))));
        mgr.registry().mark_unhealthy("t1", "t1-pod-0");

        let result = mgr.resolve("t1", None).await;
        assert!(matches!(
            result,
            Err(Error::NoHealthyBackends { .. })
        ));
        let metrics = mgr.metrics().tenant_metrics("t1").unwrap_or_default();
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_tripped_breaker_surfaces_circuit_open_with_retry_hint() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);

        // test_config uses a threshold of 2. Two failed requests trip the
        // breaker while the replica itself stays healthy.
        for _ in 0..2 {
            let resolution = mgr.resolve("t1", None).await;
            assert!(matches!(resolution, Ok(Resolution::Ready(_))));
            mgr.complete_request("t1", "t1-pod-0", 5.0, false, None);
        }

        match mgr.resolve("t1", None).await {
            Err(Error::CircuitOpen {
                instance_id,
                retry_after,
            }) => {
                assert_eq!(instance_id, "t1-pod-0");
                assert!(retry_after > Duration::ZERO);
            }
            other => panic!("expected circuit-open rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deleted_route_is_inactive_until_recreated() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        let mgr = manager(platform);

        let warmup = mgr.resolve("t1", None).await;
        assert!(matches!(warmup, Ok(Resolution::Ready(_))));

        let deleted = mgr.delete_tenant_workload("t1").await;
        assert!(deleted.is_ok());
        assert_eq!(
            mgr.platform().call_order_of(&["delete_autoscaler", "delete_service", "delete_deployment"]),
            vec!["delete_autoscaler", "delete_service", "delete_deployment"]
        );
        assert!(mgr.cache().is_empty());
        assert!(mgr.registry().snapshot("t1").is_empty());

        let result = mgr.resolve("t1", None).await;
        assert!(matches!(result, Err(Error::RouteInactive { .. })));

        // Re-provisioning reactivates the route.
        let created = mgr.create_tenant_workload("t1").await;
        assert!(created.is_ok());
        let resolution = mgr.resolve("t1", None).await;
        assert!(matches!(resolution, Ok(Resolution::Ready(_))));
    }

    #[tokio::test]
    async fn test_complete_request_releases_connection() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);

        let resolution = mgr.resolve("t1", None).await;
        assert!(matches!(resolution, Ok(Resolution::Ready(_))));
        mgr.complete_request("t1", "t1-pod-0", 12.5, true, None);

        let snap = mgr.registry().snapshot("t1");
        assert_eq!(snap[0].current_connections, 0);
        assert_eq!(snap[0].avg_response_time_ms, Some(12.5));
        let metrics = mgr.metrics().tenant_metrics("t1").unwrap_or_default();
        assert_eq!(metrics.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_report_health_feeds_breaker() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        platform.seed_endpoint("t1", "t1-pod-0", "10.0.0.1", 8080);
        let mgr = manager(platform);
        let warmup = mgr.resolve("t1", None).await;
        assert!(matches!(warmup, Ok(Resolution::Ready(_))));

        // test_config uses a threshold of 2.
        mgr.report_instance_health("t1", "t1-pod-0", false, None);
        mgr.report_instance_health("t1", "t1-pod-0", false, None);
        assert_eq!(
            mgr.breaker().state("t1-pod-0"),
            crate::breaker::CircuitState::Open
        );
    }
}
