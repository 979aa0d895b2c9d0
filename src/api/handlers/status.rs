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

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::{Error, Result},
    models::instances::{HealthReportRequest, HealthStatusResponse, TenantHealth},
    models::routes::AckResponse,
    state::AppState,
};
use crate::metrics::MetricsSummary;
use crate::platform::Platform;
use crate::types::record::{HealthCheckRecord, RouteMetrics};

/// Push-style health report, the API twin of the probe loop.
pub async fn report_health<P: Platform>(
    State(state): State<AppState<P>>,
    Json(req): Json<HealthReportRequest>,
) -> Json<AckResponse> {
    state.manager.report_instance_health(
        &req.tenant_id,
        &req.instance_id,
        req.healthy,
        req.response_time_ms,
    );

    Json(AckResponse {
        success: true,
        message: "Health report recorded".to_string(),
    })
}

/// Aggregate health across all tenants.
pub async fn health_status<P: Platform>(
    State(state): State<AppState<P>>,
) -> Json<HealthStatusResponse> {
    let registry = state.manager.registry();

    let mut tenants: Vec<TenantHealth> = registry
        .tenants()
        .into_iter()
        .map(|tenant_id| {
            let instances = registry.snapshot(&tenant_id);
            TenantHealth {
                status: registry.tenant_status(&tenant_id),
                total_instances: instances.len(),
                healthy_instances: instances.iter().filter(|i| i.is_healthy).count(),
                tenant_id,
            }
        })
        .collect();
    tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

    Json(HealthStatusResponse {
        counts: registry.counts(),
        tenants,
        tracked_breakers: state.manager.breaker().tracked(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub limit: Option<usize>,
}

/// Most recent health-probe records, newest first.
pub async fn health_records<P: Platform>(
    State(state): State<AppState<P>>,
    Query(query): Query<RecordsQuery>,
) -> Json<Vec<HealthCheckRecord>> {
    let limit = query.limit.unwrap_or(50).min(1024);
    Json(state.manager.metrics().recent_health_records(limit))
}

pub async fn metrics_summary<P: Platform>(
    State(state): State<AppState<P>>,
) -> Json<MetricsSummary> {
    Json(state.manager.metrics().summary())
}

pub async fn tenant_metrics<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<RouteMetrics>> {
    state
        .manager
        .metrics()
        .tenant_metrics(&tenant_id)
        .map(Json)
        .ok_or(Error::NotFound {
            resource: format!("metrics for tenant '{tenant_id}'"),
        })
}
