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
    extract::{Path, State},
};

use crate::api::{
    error::{Error, Result},
    models::instances::{InstanceListResponse, RegisterRequest},
    models::routes::AckResponse,
    state::AppState,
};
use crate::platform::Platform;
use crate::types::instance::BackendInstance;

/// Self-registration endpoint for backend containers that announce
/// themselves instead of waiting for endpoint discovery.
pub async fn register<P: Platform>(
    State(state): State<AppState<P>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AckResponse>> {
    if req.tenant_id.is_empty() || req.instance_id.is_empty() || req.host.is_empty() {
        return Err(Error::BadRequest {
            message: "tenantId, instanceId and host are required".to_string(),
        });
    }

    let mut instance =
        BackendInstance::new(&req.tenant_id, &req.instance_id, &req.host, req.port);
    if let Some(weight) = req.weight {
        instance.weight = weight.min(1000);
    }
    if let Some(max_connections) = req.max_connections {
        instance.max_connections = max_connections;
    }
    tracing::info!(
        "registered instance {} for tenant {} at {}",
        req.instance_id,
        req.tenant_id,
        instance.address()
    );
    state.manager.register_instance(instance);

    Ok(Json(AckResponse {
        success: true,
        message: "Instance registered".to_string(),
    }))
}

pub async fn deregister<P: Platform>(
    State(state): State<AppState<P>>,
    Path((tenant_id, instance_id)): Path<(String, String)>,
) -> Json<AckResponse> {
    state.manager.remove_instance(&tenant_id, &instance_id);
    tracing::info!("deregistered instance {} for tenant {}", instance_id, tenant_id);

    Json(AckResponse {
        success: true,
        message: "Instance removed".to_string(),
    })
}

pub async fn list_instances<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
) -> Json<InstanceListResponse> {
    let registry = state.manager.registry();
    Json(InstanceListResponse {
        status: registry.tenant_status(&tenant_id),
        instances: registry.snapshot(&tenant_id),
        tenant_id,
    })
}
