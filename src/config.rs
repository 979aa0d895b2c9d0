// Copyright 2025 Tenant Platform Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gateway configuration, resolved from environment variables with defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::balancer::HashAlgorithm;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Runtime configuration for the gateway control plane.
///
/// Every field has a usable default so a plain `GatewayConfig::from_env()`
/// works in a dev cluster; production overrides come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Namespace all tenant backend workloads live in.
    pub namespace: String,
    /// Image used when provisioning a tenant backend.
    pub backend_image: String,
    /// Container port the backend listens on.
    pub backend_port: i32,
    /// Port exposed by the tenant's ClusterIP service.
    pub service_port: i32,

    pub route_cache_ttl_secs: u64,

    pub health_check_interval_secs: u64,
    pub health_check_timeout_secs: u64,
    pub health_check_path: String,
    /// Upper bound on concurrent health probes per cycle.
    pub health_probe_concurrency: usize,

    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,

    pub autoscaler_min_replicas: i32,
    pub autoscaler_max_replicas: i32,
    /// Target average CPU utilization (percent) for the autoscaler.
    pub autoscaler_cpu_target: i32,

    pub platform_retry_attempts: u32,
    pub platform_retry_delay_ms: u64,

    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,

    pub ip_hash_algorithm: HashAlgorithm,

    /// JWT signing secret for the API surface.
    pub jwt_secret: String,
    /// Service credentials accepted by the login endpoint.
    pub service_id: String,
    pub service_secret: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            namespace: env_or("GATEWAY_NAMESPACE", "tenant-backends"),
            backend_image: env_or("BACKEND_IMAGE", "tenant-platform/backend:latest"),
            backend_port: env_parse("BACKEND_PORT", 8080),
            service_port: env_parse("SERVICE_PORT", 80),
            route_cache_ttl_secs: env_parse("ROUTE_CACHE_TTL_SECS", 300),
            health_check_interval_secs: env_parse("HEALTH_CHECK_INTERVAL_SECS", 30),
            health_check_timeout_secs: env_parse("HEALTH_CHECK_TIMEOUT_SECS", 5),
            health_check_path: env_or("HEALTH_CHECK_PATH", "/health"),
            health_probe_concurrency: env_parse("HEALTH_PROBE_CONCURRENCY", 8),
            failure_threshold: env_parse("FAILURE_THRESHOLD", 5),
            recovery_timeout_secs: env_parse("RECOVERY_TIMEOUT_SECS", 60),
            autoscaler_min_replicas: env_parse("AUTOSCALER_MIN_REPLICAS", 1),
            autoscaler_max_replicas: env_parse("AUTOSCALER_MAX_REPLICAS", 3),
            autoscaler_cpu_target: env_parse("AUTOSCALER_CPU_TARGET", 70),
            platform_retry_attempts: env_parse("PLATFORM_RETRY_ATTEMPTS", 3),
            platform_retry_delay_ms: env_parse("PLATFORM_RETRY_DELAY_MS", 1000),
            cpu_request: env_or("CPU_REQUEST", "500m"),
            cpu_limit: env_or("CPU_LIMIT", "1000m"),
            memory_request: env_or("MEMORY_REQUEST", "1Gi"),
            memory_limit: env_or("MEMORY_LIMIT", "2Gi"),
            ip_hash_algorithm: match env_or("IP_HASH_ALGORITHM", "sha256").as_str() {
                "fnv1a" => HashAlgorithm::Fnv1a,
                _ => HashAlgorithm::Sha256,
            },
            jwt_secret: env_or("JWT_SECRET", "gateway-secret-change-me-in-production"),
            service_id: env_or("GATEWAY_SERVICE_ID", "gateway-admin"),
            service_secret: env_or("GATEWAY_SERVICE_SECRET", "gateway-admin-secret"),
        }
    }

    pub fn route_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.route_cache_ttl_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn platform_retry_delay(&self) -> Duration {
        Duration::from_millis(self.platform_retry_delay_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GatewayConfig::from_env();
        assert_eq!(cfg.route_cache_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.health_check_interval(), Duration::from_secs(30));
        assert_eq!(cfg.health_check_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.health_check_path, "/health");
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.recovery_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.autoscaler_min_replicas, 1);
        assert_eq!(cfg.autoscaler_max_replicas, 3);
    }
}
