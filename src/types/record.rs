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

//! Observability records: per-request logs, per-probe health records and
//! rolled-up route metrics. None of these affect routing decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::types::route::LoadBalanceStrategy;

/// Failure classification for request logs and metrics counters.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[strum(to_string = "timeout")]
    Timeout,

    #[strum(to_string = "connection")]
    Connection,

    #[strum(to_string = "server")]
    Server,

    #[strum(to_string = "client")]
    Client,

    #[strum(to_string = "gateway")]
    Gateway,
}

/// One record per routed request.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RouteLog {
    pub request_id: String,
    pub tenant_id: String,
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub target_url: Option<String>,
    pub strategy: LoadBalanceStrategy,
    pub status: u16,
    pub response_time_ms: f64,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One record per health probe, the audit trail of the health loop.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckRecord {
    pub tenant_id: String,
    pub instance_id: String,
    pub is_healthy: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub check_url: String,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Rolled-up request counters for one tenant route.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,

    pub timeout_count: u64,
    pub connection_error_count: u64,
    pub server_error_count: u64,

    pub last_request_time: Option<DateTime<Utc>>,
}

impl RouteMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.successful_requests as f64 / self.total_requests as f64) * 100.0
    }

    /// Folds one request outcome into the running counters.
    pub fn update(&mut self, response_time_ms: f64, success: bool, error_kind: Option<ErrorKind>) {
        self.total_requests += 1;
        self.last_request_time = Some(Utc::now());

        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
            match error_kind {
                Some(ErrorKind::Timeout) => self.timeout_count += 1,
                Some(ErrorKind::Connection) => self.connection_error_count += 1,
                Some(ErrorKind::Server) => self.server_error_count += 1,
                _ => {}
            }
        }

        if self.total_requests == 1 {
            self.avg_response_time_ms = response_time_ms;
            self.min_response_time_ms = response_time_ms;
            self.max_response_time_ms = response_time_ms;
        } else {
            self.avg_response_time_ms = (self.avg_response_time_ms
                * (self.total_requests - 1) as f64
                + response_time_ms)
                / self.total_requests as f64;
            self.min_response_time_ms = self.min_response_time_ms.min(response_time_ms);
            self.max_response_time_ms = self.max_response_time_ms.max(response_time_ms);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_running_average() {
        let mut m = RouteMetrics::default();
        m.update(10.0, true, None);
        m.update(30.0, true, None);
        assert_eq!(m.total_requests, 2);
        assert_eq!(m.successful_requests, 2);
        assert!((m.avg_response_time_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(m.min_response_time_ms, 10.0);
        assert_eq!(m.max_response_time_ms, 30.0);
        assert_eq!(m.success_rate(), 100.0);
    }

    #[test]
    fn test_metrics_error_classification() {
        let mut m = RouteMetrics::default();
        m.update(5.0, false, Some(ErrorKind::Timeout));
        m.update(5.0, false, Some(ErrorKind::Connection));
        m.update(5.0, false, Some(ErrorKind::Server));
        m.update(5.0, false, Some(ErrorKind::Gateway));
        assert_eq!(m.failed_requests, 4);
        assert_eq!(m.timeout_count, 1);
        assert_eq!(m.connection_error_count, 1);
        assert_eq!(m.server_error_count, 1);
        assert_eq!(m.success_rate(), 0.0);
    }

    #[test]
    fn test_metrics_reset() {
        let mut m = RouteMetrics::default();
        m.update(5.0, true, None);
        m.reset();
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.avg_response_time_ms, 0.0);
    }
}
