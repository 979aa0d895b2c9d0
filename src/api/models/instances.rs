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

use serde::{Deserialize, Serialize};

use crate::registry::RegistryCounts;
use crate::types::instance::{BackendInstance, TenantStatus};

/// Self-registration request from a backend container.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub tenant_id: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub weight: Option<u32>,
    pub max_connections: Option<u32>,
}

/// Health report pushed by a replica or an external watcher.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReportRequest {
    pub tenant_id: String,
    pub instance_id: String,
    pub healthy: bool,
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceListResponse {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub instances: Vec<BackendInstance>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatusResponse {
    pub counts: RegistryCounts,
    pub tenants: Vec<TenantHealth>,
    pub tracked_breakers: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantHealth {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub total_instances: usize,
    pub healthy_instances: usize,
}
