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
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::api::{
    error::Result,
    models::routes::{AckResponse, CompleteRequest, CreatingResponse, RouteResponse},
    state::AppState,
};
use crate::manager::Resolution;
use crate::platform::Platform;
use crate::types::record::RouteLog;

/// Resolves the backend target for one tenant request.
///
/// While the workload is still provisioning the response is a 404 with a
/// `creating` status so callers know to retry rather than give up.
pub async fn resolve_route<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let client_ip = client_ip_from_headers(&headers);
    let resolution = state
        .manager
        .resolve(&tenant_id, client_ip.as_deref())
        .await?;

    match resolution {
        Resolution::Ready(route) => {
            state.manager.metrics().push_route_log(RouteLog {
                request_id: format!("req-{}", Utc::now().timestamp_nanos_opt().unwrap_or(0)),
                tenant_id: tenant_id.clone(),
                method: "GET".to_string(),
                path: format!("/api/v1/route/{tenant_id}"),
                client_ip: client_ip.unwrap_or_else(|| "0.0.0.0".to_string()),
                target_url: Some(route.target_url.clone()),
                strategy: route.strategy,
                status: 200,
                response_time_ms: 0.0,
                error_kind: None,
                error_message: None,
                timestamp: Utc::now(),
            });
            Ok(Json(RouteResponse {
                tenant_id: route.tenant_id,
                target_url: route.target_url,
                instance_id: route.instance_id,
                strategy: route.strategy,
                cache_hit: route.cache_hit,
            })
            .into_response())
        }
        Resolution::Creating => Ok((
            StatusCode::NOT_FOUND,
            Json(CreatingResponse {
                status: "creating",
                tenant_id: tenant_id.clone(),
                message: format!("Backend for tenant '{tenant_id}' is being provisioned"),
            }),
        )
            .into_response()),
    }
}

/// Marks a previously resolved request as finished, releasing its
/// connection slot and feeding breaker and metrics.
pub async fn complete_route<P: Platform>(
    State(state): State<AppState<P>>,
    Path(tenant_id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Json<AckResponse> {
    state.manager.complete_request(
        &tenant_id,
        &req.instance_id,
        req.response_time_ms,
        req.success,
        req.error_kind,
    );

    Json(AckResponse {
        success: true,
        message: "Request completion recorded".to_string(),
    })
}

/// Client address for ip_hash, taken from proxy headers. Absent headers
/// degrade to the placeholder inside the balancer.
fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        let first = forwarded.split(',').next().map(str::trim).unwrap_or("");
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            axum::http::HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", axum::http::HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            client_ip_from_headers(&headers).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", axum::http::HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            client_ip_from_headers(&headers).as_deref(),
            Some("198.51.100.2")
        );
    }

    #[test]
    fn test_client_ip_missing_headers() {
        assert_eq!(client_ip_from_headers(&HeaderMap::new()), None);
    }
}
