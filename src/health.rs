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

//! Background health-check loop.
//!
//! Each cycle refreshes the replica set per tenant from the platform,
//! probes every replica over HTTP with bounded concurrency, and feeds the
//! results into the registry, the circuit breaker and the health-record
//! ring. A failing tenant never stops the cycle for the others.

use chrono::Utc;
use futures::StreamExt;
use snafu::ResultExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::manager::RouteManager;
use crate::platform::Platform;
use crate::types::error::{self, Result};
use crate::types::instance::{BackendInstance, TenantStatus};
use crate::types::record::HealthCheckRecord;

/// Result of probing one replica.
#[derive(Debug, Clone)]
struct ProbeOutcome {
    tenant_id: String,
    instance_id: String,
    healthy: bool,
    status_code: Option<u16>,
    response_time_ms: Option<f64>,
    check_url: String,
    error_message: Option<String>,
}

/// Any 2xx answer within the timeout counts as healthy.
fn classify_status(status: u16) -> bool {
    (200..300).contains(&status)
}

pub struct HealthChecker<P> {
    manager: Arc<RouteManager<P>>,
    client: reqwest::Client,
}

impl<P: Platform> HealthChecker<P> {
    pub fn new(manager: Arc<RouteManager<P>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(manager.config().health_check_timeout())
            .build()
            .context(error::HttpSnafu)?;
        Ok(Self { manager, client })
    }

    /// Runs forever, one cycle per configured interval.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.manager.config().health_check_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_cycle().await;
        }
    }

    /// One full pass over every known tenant.
    pub async fn run_cycle(&self) {
        for tenant_id in self.manager.health_targets() {
            if let Err(err) = self.check_tenant(&tenant_id).await {
                warn!("health check for tenant {} failed: {}", tenant_id, err);
            }
        }
        self.manager.breaker().sweep();

        let counts = self.manager.registry().counts();
        info!(
            "health cycle done: {}/{} instances healthy",
            counts.healthy, counts.total
        );
    }

    async fn check_tenant(&self, tenant_id: &str) -> Result<()> {
        if let Some(route) = self.manager.route(tenant_id) {
            if !route.health_check.enabled {
                debug!("health checks disabled for tenant {}", tenant_id);
                return Ok(());
            }
        }
        self.manager.sync_endpoints(tenant_id).await?;

        let instances = self.manager.registry().snapshot(tenant_id);
        if instances.is_empty() {
            return Ok(());
        }

        let path = self
            .manager
            .route(tenant_id)
            .map(|r| r.health_check.path)
            .unwrap_or_else(|| self.manager.config().health_check_path.clone());
        let concurrency = self.manager.config().health_probe_concurrency.max(1);

        let outcomes: Vec<ProbeOutcome> = futures::stream::iter(
            instances.into_iter().map(|inst| self.probe(inst, &path)),
        )
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let mut healthy = 0usize;
        for outcome in outcomes {
            if outcome.healthy {
                healthy += 1;
            }
            self.manager.report_instance_health(
                tenant_id,
                &outcome.instance_id,
                outcome.healthy,
                outcome.response_time_ms,
            );
            self.manager.metrics().push_health_record(HealthCheckRecord {
                tenant_id: outcome.tenant_id,
                instance_id: outcome.instance_id,
                is_healthy: outcome.healthy,
                status_code: outcome.status_code,
                response_time_ms: outcome.response_time_ms,
                check_url: outcome.check_url,
                error_message: outcome.error_message,
                timestamp: Utc::now(),
            });
        }

        let status = if healthy == 0 {
            TenantStatus::Error
        } else {
            TenantStatus::Running
        };
        self.manager.registry().set_tenant_status(tenant_id, status);
        Ok(())
    }

    async fn probe(&self, instance: BackendInstance, path: &str) -> ProbeOutcome {
        let check_url = format!("{}{}", instance.url(), path);
        let started = Instant::now();

        match self.client.get(&check_url).send().await {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                let status = response.status().as_u16();
                ProbeOutcome {
                    tenant_id: instance.tenant_id,
                    instance_id: instance.instance_id,
                    healthy: classify_status(status),
                    status_code: Some(status),
                    response_time_ms: Some(elapsed_ms),
                    check_url,
                    error_message: None,
                }
            }
            Err(err) => {
                let message = if err.is_timeout() {
                    "probe timed out".to_string()
                } else {
                    err.to_string()
                };
                ProbeOutcome {
                    tenant_id: instance.tenant_id,
                    instance_id: instance.instance_id,
                    healthy: false,
                    status_code: None,
                    response_time_ms: None,
                    check_url,
                    error_message: Some(message),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{FakePlatform, test_config};

    #[test]
    fn test_classify_status() {
        assert!(classify_status(200));
        assert!(classify_status(204));
        assert!(!classify_status(301));
        assert!(!classify_status(404));
        assert!(!classify_status(500));
        assert!(!classify_status(503));
    }

    #[tokio::test]
    async fn test_unreachable_replicas_mark_tenant_error() {
        let platform = FakePlatform::default();
        // Nothing listens here; the probe fails with connection refused.
        platform.seed_endpoint("t1", "t1-pod-0", "127.0.0.1", 59999);
        let manager = RouteManager::new(platform, test_config());
        manager.sync_endpoints("t1").await.ok();

        let checker = match HealthChecker::new(Arc::clone(&manager)) {
            Ok(checker) => checker,
            Err(err) => panic!("client build failed: {err}"),
        };
        checker.run_cycle().await;

        assert_eq!(manager.registry().tenant_status("t1"), TenantStatus::Error);
        let snap = manager.registry().snapshot("t1");
        assert!(!snap[0].is_healthy);
        assert_eq!(snap[0].consecutive_failures, 1);
        assert_eq!(manager.metrics().recent_health_records(10).len(), 1);
    }

    #[tokio::test]
    async fn test_routed_tenant_without_replicas_is_still_synced() {
        let platform = FakePlatform::default();
        platform.seed_service("t1", "10.96.0.5", 80);
        let manager = RouteManager::new(platform, test_config());

        // Resolving creates the route while the endpoint list is empty.
        let warmup = manager.resolve("t1", None).await;
        assert!(matches!(warmup, Ok(crate::manager::Resolution::Ready(_))));
        assert!(manager.registry().snapshot("t1").is_empty());

        // A replica appears between cycles; the next cycle must pick it
        // up even though the registry had nothing for the tenant.
        manager
            .platform()
            .seed_endpoint("t1", "t1-pod-0", "127.0.0.1", 59999);
        let checker = match HealthChecker::new(Arc::clone(&manager)) {
            Ok(checker) => checker,
            Err(err) => panic!("client build failed: {err}"),
        };
        checker.run_cycle().await;

        assert_eq!(manager.registry().snapshot("t1").len(), 1);
    }

    #[tokio::test]
    async fn test_gone_replicas_are_dropped_from_registry() {
        let platform = FakePlatform::default();
        platform.seed_endpoint("t1", "t1-pod-0", "127.0.0.1", 59999);
        let manager = RouteManager::new(platform, test_config());
        manager.sync_endpoints("t1").await.ok();
        // A replica the platform no longer reports.
        manager.register_instance(BackendInstance::new("t1", "t1-pod-9", "10.0.0.9", 8080));
        assert_eq!(manager.registry().snapshot("t1").len(), 2);

        manager.sync_endpoints("t1").await.ok();
        let snap = manager.registry().snapshot("t1");
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].instance_id, "t1-pod-0");
    }
}
