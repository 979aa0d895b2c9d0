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

use kube::Client;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::api::{server, state::AppState};
use crate::config::GatewayConfig;
use crate::health::HealthChecker;
use crate::manager::RouteManager;
use crate::platform::kube::KubePlatform;

pub mod api;
pub mod balancer;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod health;
pub mod manager;
pub mod metrics;
pub mod platform;
pub mod registry;
pub mod types;


/// Runs the gateway control plane: health-check loop plus the API server.
pub async fn run(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let config = GatewayConfig::from_env();
    info!(
        "gateway starting: namespace={}, cache ttl={}s, health interval={}s",
        config.namespace, config.route_cache_ttl_secs, config.health_check_interval_secs
    );

    let client = Client::try_default().await?;
    let platform = KubePlatform::new(client, &config);
    let manager = RouteManager::new(platform, config);

    let checker = HealthChecker::new(Arc::clone(&manager))?;
    tokio::spawn(checker.run());

    let state = AppState::new(manager);
    server::run(state, port).await
}

/// Dumps the resolved configuration as JSON, to a file or stdout.
pub async fn dump_config(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_json::to_string_pretty(&GatewayConfig::from_env())?.as_bytes())
        .await?;
    writer.write_all(b"\n").await?;

    Ok(())
}
