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

//! In-memory observability store: per-tenant route metrics plus bounded
//! rings of request logs and health-check records.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::record::{ErrorKind, HealthCheckRecord, RouteLog, RouteMetrics};

const LOG_RING_CAPACITY: usize = 1024;
const HEALTH_RING_CAPACITY: usize = 1024;

/// Aggregate view for the metrics-summary endpoint.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_tenants: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub overall_success_rate: f64,
}

#[derive(Default)]
pub struct MetricsStore {
    per_tenant: DashMap<String, RouteMetrics>,
    route_logs: Mutex<VecDeque<RouteLog>>,
    health_records: Mutex<VecDeque<HealthCheckRecord>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one resolution outcome into the tenant's counters.
    pub fn record_request(
        &self,
        tenant_id: &str,
        response_time_ms: f64,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) {
        self.per_tenant
            .entry(tenant_id.to_string())
            .or_default()
            .update(response_time_ms, success, error_kind);
    }

    pub fn push_route_log(&self, log: RouteLog) {
        if let Ok(mut ring) = self.route_logs.lock() {
            if ring.len() == LOG_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(log);
        }
    }

    pub fn push_health_record(&self, record: HealthCheckRecord) {
        if let Ok(mut ring) = self.health_records.lock() {
            if ring.len() == HEALTH_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(record);
        }
    }

    pub fn tenant_metrics(&self, tenant_id: &str) -> Option<RouteMetrics> {
        self.per_tenant.get(tenant_id).map(|m| m.clone())
    }

    pub fn recent_route_logs(&self, limit: usize) -> Vec<RouteLog> {
        self.route_logs
            .lock()
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn recent_health_records(&self, limit: usize) -> Vec<HealthCheckRecord> {
        self.health_records
            .lock()
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut summary = MetricsSummary {
            total_tenants: self.per_tenant.len(),
            ..Default::default()
        };
        for m in self.per_tenant.iter() {
            summary.total_requests += m.total_requests;
            summary.successful_requests += m.successful_requests;
            summary.failed_requests += m.failed_requests;
        }
        if summary.total_requests > 0 {
            summary.overall_success_rate =
                (summary.successful_requests as f64 / summary.total_requests as f64) * 100.0;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::route::LoadBalanceStrategy;
    use chrono::Utc;

    #[test]
    fn test_summary_aggregates_tenants() {
        let store = MetricsStore::new();
        store.record_request("t1", 10.0, true, None);
        store.record_request("t1", 20.0, false, Some(ErrorKind::Server));
        store.record_request("t2", 5.0, true, None);

        let summary = store.summary();
        assert_eq!(summary.total_tenants, 2);
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.successful_requests, 2);
        assert_eq!(summary.failed_requests, 1);
        assert!((summary.overall_success_rate - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let store = MetricsStore::new();
        for i in 0..(LOG_RING_CAPACITY + 10) {
            store.push_route_log(RouteLog {
                request_id: format!("req-{i}"),
                tenant_id: "t1".to_string(),
                method: "GET".to_string(),
                path: "/".to_string(),
                client_ip: "127.0.0.1".to_string(),
                target_url: None,
                strategy: LoadBalanceStrategy::RoundRobin,
                status: 200,
                response_time_ms: 1.0,
                error_kind: None,
                error_message: None,
                timestamp: Utc::now(),
            });
        }
        let recent = store.recent_route_logs(usize::MAX);
        assert_eq!(recent.len(), LOG_RING_CAPACITY);
        // Newest first.
        assert_eq!(recent[0].request_id, format!("req-{}", LOG_RING_CAPACITY + 9));
    }
}
