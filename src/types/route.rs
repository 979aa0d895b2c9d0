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

//! Per-tenant routing records: route entry, load-balancing strategy and
//! health-check policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Load-balancing strategy assigned to a tenant route.
///
/// A closed enum; anything unrecognized parses as `RoundRobin` so a bad
/// strategy name in stored state can never break routing.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[strum(to_string = "round_robin")]
    #[default]
    RoundRobin,

    #[strum(to_string = "least_conn")]
    LeastConn,

    #[strum(to_string = "weighted")]
    Weighted,

    #[strum(to_string = "ip_hash")]
    IpHash,

    #[strum(to_string = "response_time")]
    ResponseTime,
}

impl LoadBalanceStrategy {
    /// Parses a strategy by name, falling back to round-robin.
    pub fn from_name(name: &str) -> Self {
        match name {
            "round_robin" => Self::RoundRobin,
            "least_conn" => Self::LeastConn,
            "weighted" => Self::Weighted,
            "ip_hash" => Self::IpHash,
            "response_time" => Self::ResponseTime,
            _ => Self::RoundRobin,
        }
    }
}

/// Health-check policy carried by a tenant route.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckPolicy {
    pub enabled: bool,
    pub path: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Consecutive failures before an instance is considered gone.
    pub max_failures: u32,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
            interval_secs: 30,
            timeout_secs: 5,
            max_failures: 3,
        }
    }
}

/// Connection and resilience limits for a tenant's load balancer.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: f64,
    pub circuit_breaker_enabled: bool,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            connection_timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_secs: 1.0,
            circuit_breaker_enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

/// One routing record per tenant.
///
/// Never physically deleted while the tenant exists; lifecycle deletion
/// only flips `is_active` off.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TenantRoute {
    pub tenant_id: String,
    pub route_path: String,
    pub target_service: String,
    pub target_namespace: String,
    pub strategy: LoadBalanceStrategy,
    pub health_check: HealthCheckPolicy,
    pub balancer: LoadBalancerConfig,
    pub is_active: bool,
    pub last_route_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TenantRoute {
    pub fn new(tenant_id: &str, target_service: &str, namespace: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            route_path: format!("/route/{tenant_id}"),
            target_service: target_service.to_string(),
            target_namespace: namespace.to_string(),
            strategy: LoadBalanceStrategy::default(),
            health_check: HealthCheckPolicy::default(),
            balancer: LoadBalancerConfig::default(),
            is_active: true,
            last_route_time: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_name_falls_back_to_round_robin() {
        assert_eq!(
            LoadBalanceStrategy::from_name("least_conn"),
            LoadBalanceStrategy::LeastConn
        );
        assert_eq!(
            LoadBalanceStrategy::from_name("no-such-strategy"),
            LoadBalanceStrategy::RoundRobin
        );
        assert_eq!(
            LoadBalanceStrategy::from_name(""),
            LoadBalanceStrategy::RoundRobin
        );
    }

    #[test]
    fn test_strategy_display_matches_wire_names() {
        assert_eq!(LoadBalanceStrategy::IpHash.to_string(), "ip_hash");
        assert_eq!(
            LoadBalanceStrategy::ResponseTime.to_string(),
            "response_time"
        );
    }
}
