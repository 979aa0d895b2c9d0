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
    Extension, Json,
    extract::{Request, State},
    http::header,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use snafu::ResultExt;

use crate::api::{
    error::{self, Error, Result},
    models::auth::{LoginRequest, LoginResponse, LogoutResponse, SessionResponse},
    state::{AppState, Claims},
};
use crate::platform::Platform;

/// Exchanges service credentials for a bearer token.
pub async fn login<P: Platform>(
    State(state): State<AppState<P>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if req.service_id != *state.service_id || req.service_secret != *state.service_secret {
        tracing::warn!("login rejected for service '{}'", req.service_id);
        return Err(Error::Unauthorized {
            message: "Invalid service credentials".to_string(),
        });
    }

    let claims = Claims::new(req.service_id);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .context(error::JwtSnafu)?;

    let expires_at =
        chrono::DateTime::from_timestamp(claims.exp as i64, 0).map(|dt| dt.to_rfc3339());
    Ok(Json(LoginResponse {
        success: true,
        token: Some(token),
        expires_at,
    }))
}

/// Revokes the presented token for the remainder of its lifetime.
pub async fn logout<P: Platform>(
    State(state): State<AppState<P>>,
    request: Request,
) -> Json<LogoutResponse> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    if !token.is_empty() {
        state.revoked_tokens.insert(token.to_string());
    }

    Json(LogoutResponse {
        success: true,
        message: "Logout successful".to_string(),
    })
}

/// Reports whether the current session is valid and when it expires.
pub async fn session_check(Extension(claims): Extension<Claims>) -> Json<SessionResponse> {
    let expires_at =
        chrono::DateTime::from_timestamp(claims.exp as i64, 0).map(|dt| dt.to_rfc3339());

    Json(SessionResponse {
        valid: true,
        subject: claims.sub,
        expires_at,
    })
}
