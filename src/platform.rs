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

//! Orchestration-platform boundary.
//!
//! The routing core only ever talks to this trait; the Kubernetes
//! implementation lives in [`kube`] and tests use an in-memory fake.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::GatewayConfig;
use crate::types::error::Result;

pub mod kube;
pub mod workload;

/// Snapshot of a tenant's cluster-internal service.
#[derive(Default, Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePortInfo>,
}

#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortInfo {
    pub port: i32,
    pub target_port: i32,
}

impl ServiceInfo {
    /// Service-level target, used as a fallback when no replica addresses
    /// are known yet.
    pub fn url(&self) -> Option<String> {
        let ip = self.cluster_ip.as_deref()?;
        let port = self.ports.first().map(|p| p.port).unwrap_or(80);
        Some(format!("http://{ip}:{port}"))
    }
}

/// One live replica address as reported by the platform.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PodAddress {
    pub ip: String,
    pub port: u16,
    pub pod_name: Option<String>,
}

impl PodAddress {
    /// Stable registry key: the pod name when the platform reports one,
    /// otherwise the address itself.
    pub fn instance_id(&self) -> String {
        self.pod_name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.ip, self.port))
    }
}

/// Provisioning parameters for a tenant workload.
#[derive(Clone, Debug)]
pub struct WorkloadSpec {
    pub image: String,
    pub backend_port: i32,
    pub service_port: i32,
    pub replicas: i32,
    pub health_check_path: String,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub cpu_target: i32,
}

impl WorkloadSpec {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            image: config.backend_image.clone(),
            backend_port: config.backend_port,
            service_port: config.service_port,
            replicas: 1,
            health_check_path: config.health_check_path.clone(),
            cpu_request: config.cpu_request.clone(),
            cpu_limit: config.cpu_limit.clone(),
            memory_request: config.memory_request.clone(),
            memory_limit: config.memory_limit.clone(),
            min_replicas: config.autoscaler_min_replicas,
            max_replicas: config.autoscaler_max_replicas,
            cpu_target: config.autoscaler_cpu_target,
        }
    }
}

/// Operations the gateway consumes from the orchestration platform.
///
/// All operations are idempotent: creates tolerate "already exists",
/// deletes tolerate "not found". Discovery reads are side-effect-free.
pub trait Platform: Send + Sync + 'static {
    fn get_service(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<Option<ServiceInfo>>> + Send;

    fn get_endpoints(&self, tenant_id: &str)
    -> impl Future<Output = Result<Vec<PodAddress>>> + Send;

    fn create_deployment(
        &self,
        tenant_id: &str,
        spec: &WorkloadSpec,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_service(
        &self,
        tenant_id: &str,
        spec: &WorkloadSpec,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_autoscaler(
        &self,
        tenant_id: &str,
        spec: &WorkloadSpec,
    ) -> impl Future<Output = Result<()>> + Send;

    fn scale_deployment(
        &self,
        tenant_id: &str,
        replicas: i32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_deployment(&self, tenant_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_service(&self, tenant_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn delete_autoscaler(&self, tenant_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Runs a platform call up to `attempts` times with a fixed delay.
///
/// 404/409 responses are definitive answers, not transient faults, and
/// are returned immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_found() || err.is_already_exists() => return Err(err),
            Err(err) => {
                warn!(
                    "platform call '{}' failed (attempt {}/{}): {}",
                    what, attempt, attempts, err
                );
                last = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last.unwrap_or_else(|| crate::types::error::Error::Internal {
        msg: format!("platform call '{what}' failed with no attempts"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_stops_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("op", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(crate::types::error::Error::Internal {
                    msg: "transient".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(crate::types::error::Error::Internal {
                        msg: "transient".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.ok(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("op", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(crate::types::error::Error::NotFound {
                    resource: "deployment".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_url_fallback() {
        let svc = ServiceInfo {
            name: "tenant-backend-svc-t1".to_string(),
            namespace: "tenant-backends".to_string(),
            cluster_ip: Some("10.96.0.5".to_string()),
            ports: vec![ServicePortInfo {
                port: 80,
                target_port: 8080,
            }],
        };
        assert_eq!(svc.url().as_deref(), Some("http://10.96.0.5:80"));
        assert!(ServiceInfo::default().url().is_none());
    }
}
