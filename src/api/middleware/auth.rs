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
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::api::state::{AppState, Claims};
use crate::platform::Platform;

/// Bearer-token auth middleware.
///
/// Verifies the JWT, rejects revoked tokens and injects the claims into
/// the request extensions.
pub async fn auth_middleware<P: Platform>(
    State(state): State<AppState<P>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Public paths.
    let path = request.uri().path();
    if path == "/healthz" || path == "/readyz" || path == "/api/v1/login" {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = parse_bearer(auth_header).ok_or(StatusCode::UNAUTHORIZED)?;

    if state.revoked_tokens.contains(token) {
        tracing::warn!("rejected revoked token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        StatusCode::UNAUTHORIZED
    })?
    .claims;

    let now = chrono::Utc::now().timestamp() as usize;
    if claims.exp < now {
        tracing::warn!("token expired");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if claims.scope != Claims::SCOPE {
        tracing::warn!("token has wrong scope '{}'", claims.scope);
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn parse_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
