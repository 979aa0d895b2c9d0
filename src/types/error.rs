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

use snafu::Snafu;
use std::time::Duration;

/// Error taxonomy for the routing core.
///
/// `NotFound` and `NoHealthyBackends` are recoverable routing outcomes;
/// `Platform` wraps orchestration API failures after retries are
/// exhausted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} not found", resource))]
    NotFound { resource: String },

    #[snafu(display("no healthy backends available for tenant '{}'", tenant_id))]
    NoHealthyBackends { tenant_id: String },

    #[snafu(display(
        "circuit open for instance '{}', retry after {:?}",
        instance_id,
        retry_after
    ))]
    CircuitOpen {
        instance_id: String,
        retry_after: Duration,
    },

    #[snafu(display("route for tenant '{}' is deactivated", tenant_id))]
    RouteInactive { tenant_id: String },

    #[snafu(display("orchestration platform error: {}", source))]
    Platform { source: kube::Error },

    #[snafu(display("http client error: {}", source))]
    Http { source: reqwest::Error },

    #[snafu(display("internal error: {}", msg))]
    Internal { msg: String },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    /// True when the underlying kube API response was a 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Platform { source } => kube_status(source) == Some(404),
            _ => false,
        }
    }

    /// True when the underlying kube API response was a 409 AlreadyExists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::Platform { source } => kube_status(source) == Some(409),
            _ => false,
        }
    }
}

fn kube_status(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(resp) => Some(resp.code),
        _ => None,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::Platform {
            source: kube::Error::Api(
                kube::core::Status::failure("", "").with_code(code).boxed(),
            ),
        }
    }

    #[test]
    fn test_platform_status_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_already_exists());
        assert!(api_error(409).is_already_exists());
        assert!(!api_error(409).is_not_found());
        assert!(!api_error(500).is_not_found());
        assert!(!api_error(500).is_already_exists());
    }

    #[test]
    fn test_not_found_variant() {
        let err = Error::NotFound {
            resource: "service".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
    }
}
