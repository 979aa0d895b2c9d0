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

use dashmap::DashSet;
use std::sync::Arc;

use crate::manager::RouteManager;
use crate::platform::Platform;

/// Shared API state. Cloning is cheap; everything of weight is behind an
/// `Arc`.
pub struct AppState<P> {
    pub manager: Arc<RouteManager<P>>,
    pub jwt_secret: Arc<String>,
    pub service_id: Arc<String>,
    pub service_secret: Arc<String>,
    /// Tokens invalidated by logout before their natural expiry.
    pub revoked_tokens: Arc<DashSet<String>>,
}

// Manual impl: deriving Clone would put a `P: Clone` bound on it.
impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            jwt_secret: Arc::clone(&self.jwt_secret),
            service_id: Arc::clone(&self.service_id),
            service_secret: Arc::clone(&self.service_secret),
            revoked_tokens: Arc::clone(&self.revoked_tokens),
        }
    }
}

impl<P: Platform> AppState<P> {
    pub fn new(manager: Arc<RouteManager<P>>) -> Self {
        let config = manager.config();
        let jwt_secret = Arc::new(config.jwt_secret.clone());
        let service_id = Arc::new(config.service_id.clone());
        let service_secret = Arc::new(config.service_secret.clone());
        Self {
            manager,
            jwt_secret,
            service_id,
            service_secret,
            revoked_tokens: Arc::new(DashSet::new()),
        }
    }
}

/// JWT claims carried by every authenticated request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Service identity the token was issued to.
    pub sub: String,
    /// Access scope; only [`Claims::SCOPE`] tokens are accepted.
    pub scope: String,
    /// Token expiry (Unix timestamp).
    pub exp: usize,
    /// Token issue time.
    pub iat: usize,
}

impl Claims {
    pub const TTL_SECS: usize = 12 * 3600;
    pub const SCOPE: &'static str = "gateway";

    pub fn new(service_id: String) -> Self {
        let now = chrono::Utc::now().timestamp() as usize;
        Self {
            sub: service_id,
            scope: Self::SCOPE.to_string(),
            iat: now,
            exp: now + Self::TTL_SECS,
        }
    }
}
