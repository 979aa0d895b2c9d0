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
    Router,
    routing::{delete, get, post, put},
};

use crate::api::{handlers, state::AppState};
use crate::platform::Platform;

pub fn auth_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .route("/session", get(handlers::auth::session_check))
}

pub fn route_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route("/route/{tenant_id}", get(handlers::routes::resolve_route))
        .route(
            "/route/{tenant_id}/complete",
            post(handlers::routes::complete_route),
        )
}

pub fn instance_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route("/containers/register", post(handlers::instances::register))
        .route(
            "/tenants/{tenant_id}/instances",
            get(handlers::instances::list_instances),
        )
        .route(
            "/tenants/{tenant_id}/instances/{instance_id}",
            delete(handlers::instances::deregister),
        )
}

pub fn health_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route("/health/report", post(handlers::status::report_health))
        .route("/health/status", get(handlers::status::health_status))
        .route("/health/records", get(handlers::status::health_records))
}

pub fn metrics_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route("/metrics/summary", get(handlers::status::metrics_summary))
        .route(
            "/metrics/tenants/{tenant_id}",
            get(handlers::status::tenant_metrics),
        )
}

pub fn workload_routes<P: Platform>() -> Router<AppState<P>> {
    Router::new()
        .route(
            "/tenants/{tenant_id}/workload",
            post(handlers::workloads::create_workload),
        )
        .route(
            "/tenants/{tenant_id}/workload",
            delete(handlers::workloads::delete_workload),
        )
        .route(
            "/tenants/{tenant_id}/scale",
            post(handlers::workloads::scale_workload),
        )
        .route(
            "/tenants/{tenant_id}/strategy",
            put(handlers::workloads::set_strategy),
        )
}
