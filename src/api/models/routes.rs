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

use crate::types::record::ErrorKind;
use crate::types::route::LoadBalanceStrategy;

/// Successful resolution payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub tenant_id: String,
    pub target_url: String,
    pub instance_id: Option<String>,
    pub strategy: LoadBalanceStrategy,
    pub cache_hit: bool,
}

/// Returned with a 404 while the tenant's workload is provisioning.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatingResponse {
    pub status: &'static str,
    pub tenant_id: String,
    pub message: String,
}

/// Completion report for a previously resolved request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub instance_id: String,
    pub response_time_ms: f64,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRequest {
    pub replicas: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRequest {
    pub strategy: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}
