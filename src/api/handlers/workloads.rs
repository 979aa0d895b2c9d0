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

//! Admin endpoints for tenant workload lifecycle.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{Error, Result},
    models::routes::{AckResponse, ScaleRequest, StrategyRequest},
    state::AppState,
};
use crate::platform::Platform;
use crate::types::route::LoadBalanceStrategy;

pub async fn create_workload<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<AckResponse>> {
    state.manager.create_tenant_workload(&tenant_id).await?;

    Ok(Json(AckResponse {
        success: true,
        message: format!("Workload for tenant '{tenant_id}' provisioned"),
    }))
}

pub async fn delete_workload<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<AckResponse>> {
    state.manager.delete_tenant_workload(&tenant_id).await?;

    Ok(Json(AckResponse {
        success: true,
        message: format!("Workload for tenant '{tenant_id}' deleted"),
    }))
}

pub async fn scale_workload<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> Result<Json<AckResponse>> {
    if req.replicas < 0 {
        return Err(Error::BadRequest {
            message: "replicas must be non-negative".to_string(),
        });
    }
    state
        .manager
        .scale_tenant_workload(&tenant_id, req.replicas)
        .await?;

    Ok(Json(AckResponse {
        success: true,
        message: format!("Workload for tenant '{tenant_id}' scaled to {}", req.replicas),
    }))
}

/// Sets the load-balancing strategy for a tenant route. Unknown names
/// fall back to round-robin rather than failing the request.
pub async fn set_strategy<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<StrategyRequest>,
) -> Json<AckResponse> {
    let strategy = LoadBalanceStrategy::from_name(&req.strategy);
    state.manager.set_strategy(&tenant_id, strategy);

    Json(AckResponse {
        success: true,
        message: format!("Strategy for tenant '{tenant_id}' set to {strategy}"),
    })
}
