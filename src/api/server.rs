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

use axum::http::{HeaderValue, Method, header};
use axum::{Router, http::StatusCode, middleware, response::IntoResponse, routing::get};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::api::{middleware::auth::auth_middleware, routes, state::AppState};
use crate::platform::Platform;

/// Starts the gateway API server.
pub async fn run<P: Platform>(
    state: AppState<P>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting gateway API on port {}", port);

    let allowed_origin = std::env::var("GATEWAY_CORS_ORIGIN")
        .ok()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
        .unwrap_or_else(|| HeaderValue::from_static("http://localhost:3000"));

    let app = Router::new()
        // Liveness and readiness, unauthenticated.
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .nest("/api/v1", api_routes())
        .with_state(state.clone())
        // Middleware layers, innermost first.
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<P>,
        ));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Gateway API listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  - POST /api/v1/login");
    tracing::info!("  - GET  /api/v1/route/{{tenant_id}}");
    tracing::info!("  - POST /api/v1/containers/register");
    tracing::info!("  - GET  /api/v1/health/status");
    tracing::info!("  - GET  /healthz");

    axum::serve(listener, app).await?;

    Ok(())
}

fn api_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .merge(routes::auth_routes())
        .merge(routes::route_routes())
        .merge(routes::instance_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .merge(routes::workload_routes())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}
