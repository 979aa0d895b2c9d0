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

//! Backend replica state tracked by the instance registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

pub const DEFAULT_WEIGHT: u32 = 100;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 100;

/// Lifecycle status of a backend replica.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[strum(to_string = "starting")]
    #[default]
    Starting,

    #[strum(to_string = "running")]
    Running,

    #[strum(to_string = "stopping")]
    Stopping,

    #[strum(to_string = "stopped")]
    Stopped,

    #[strum(to_string = "failed")]
    Failed,
}

/// Aggregate state of a tenant's backend as seen by the health checker.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[strum(to_string = "creating")]
    #[default]
    Creating,

    #[strum(to_string = "running")]
    Running,

    #[strum(to_string = "error")]
    Error,

    #[strum(to_string = "terminating")]
    Terminating,
}

/// One running replica of a tenant's backend.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BackendInstance {
    pub tenant_id: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    /// Selection weight for the weighted strategy, 0..=1000.
    pub weight: u32,
    pub current_connections: u32,
    pub max_connections: u32,
    /// Most recent observed response time, fed by health probes and
    /// request completions.
    pub avg_response_time_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl BackendInstance {
    pub fn new(tenant_id: &str, instance_id: &str, host: &str, port: u16) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            instance_id: instance_id.to_string(),
            host: host.to_string(),
            port,
            status: InstanceStatus::Running,
            is_healthy: true,
            consecutive_failures: 0,
            weight: DEFAULT_WEIGHT,
            current_connections: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            avg_response_time_ms: None,
            created_at: Utc::now(),
            last_health_check: None,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Capacity half of the eligibility invariant; health and circuit
    /// state are checked by the registry and breaker.
    pub fn has_capacity(&self) -> bool {
        self.current_connections < self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_url() {
        let inst = BackendInstance::new("t1", "t1-pod-0", "10.0.0.7", 8080);
        assert_eq!(inst.address(), "10.0.0.7:8080");
        assert_eq!(inst.url(), "http://10.0.0.7:8080");
        assert_eq!(inst.status, InstanceStatus::Running);
        assert!(inst.is_healthy);
        assert!(inst.has_capacity());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(InstanceStatus::Running.to_string(), "running");
        assert_eq!(TenantStatus::Error.to_string(), "error");
    }
}
