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
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use snafu::Snafu;

use crate::types::error::Error as CoreError;

/// API error type. Routing-core errors pass through `Routing` and are
/// mapped to status codes in `into_response`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unauthorized: {}", message))]
    Unauthorized { message: String },

    #[snafu(display("Not found: {}", resource))]
    NotFound { resource: String },

    #[snafu(display("Bad request: {}", message))]
    BadRequest { message: String },

    #[snafu(display("Internal server error: {}", message))]
    InternalServer { message: String },

    #[snafu(display("JWT error: {}", source))]
    Jwt { source: jsonwebtoken::errors::Error },

    #[snafu(transparent)]
    Routing { source: CoreError },
}

/// JSON error body shared by every failure response.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message, retry_after) = match &self {
            Error::Unauthorized { message } => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", message.clone(), None)
            }
            Error::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                "NotFound",
                format!("Resource not found: {resource}"),
                None,
            ),
            Error::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, "BadRequest", message.clone(), None)
            }
            Error::InternalServer { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                message.clone(),
                None,
            ),
            Error::Jwt { source } => (
                StatusCode::UNAUTHORIZED,
                "JwtError",
                format!("Invalid or expired token: {source}"),
                None,
            ),
            Error::Routing { source } => return routing_response(source),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            retry_after_secs: retry_after,
        });
        (status, body).into_response()
    }
}

fn routing_response(source: &CoreError) -> Response {
    let (status, error_type, retry_after) = match source {
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound", None),
        CoreError::RouteInactive { .. } => (StatusCode::NOT_FOUND, "RouteInactive", None),
        CoreError::NoHealthyBackends { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "NoHealthyBackends", None)
        }
        CoreError::CircuitOpen { retry_after, .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "CircuitOpen",
            Some(retry_after.as_secs()),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError", None),
    };

    let body = Json(ErrorResponse {
        error: error_type.to_string(),
        message: source.to_string(),
        retry_after_secs: retry_after,
    });

    let mut response = (status, body).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// Result type for API handlers.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_healthy_backends_maps_to_503() {
        let response = Error::Routing {
            source: CoreError::NoHealthyBackends {
                tenant_id: "t1".to_string(),
            },
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_circuit_open_sets_retry_after_header() {
        let response = Error::Routing {
            source: CoreError::CircuitOpen {
                instance_id: "i1".to_string(),
                retry_after: Duration::from_secs(42),
            },
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn test_route_inactive_maps_to_404() {
        let response = Error::Routing {
            source: CoreError::RouteInactive {
                tenant_id: "t1".to_string(),
            },
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
