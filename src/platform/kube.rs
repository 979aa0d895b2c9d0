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

//! Kubernetes implementation of the [`Platform`] trait.

use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::autoscaling::v2 as autoscalingv2;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

use super::{PodAddress, Platform, ServiceInfo, ServicePortInfo, WorkloadSpec, with_retry, workload};
use crate::config::GatewayConfig;
use crate::types::error::{self, Error, Result};

pub struct KubePlatform {
    client: kube::Client,
    namespace: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl KubePlatform {
    pub fn new(client: kube::Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            namespace: config.namespace.clone(),
            retry_attempts: config.platform_retry_attempts,
            retry_delay: config.platform_retry_delay(),
        }
    }

    fn api<T>(&self) -> Api<T>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope> + DeserializeOwned,
        <T as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Create tolerating 409: a second create of the same object is a
    /// no-op, never an error.
    async fn create_idempotent<T>(&self, what: &str, resource: &T) -> Result<()>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + Debug,
        <T as Resource>::DynamicType: Default,
    {
        let api: Api<T> = self.api();
        let result = with_retry(what, self.retry_attempts, self.retry_delay, || async {
            api.create(&PostParams::default(), resource)
                .await
                .context(error::PlatformSnafu)?;
            Ok(())
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_exists() => {
                debug!("{} already exists, skipping create", what);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Delete tolerating 404.
    async fn delete_idempotent<T>(&self, what: &str, name: &str) -> Result<()>
    where
        T: Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <T as Resource>::DynamicType: Default,
    {
        let api: Api<T> = self.api();
        let result = with_retry(what, self.retry_attempts, self.retry_delay, || async {
            api.delete(name, &DeleteParams::default())
                .await
                .context(error::PlatformSnafu)?;
            Ok(())
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!("{} '{}' already gone", what, name);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Platform for KubePlatform {
    async fn get_service(&self, tenant_id: &str) -> Result<Option<ServiceInfo>> {
        let api: Api<corev1::Service> = self.api();
        let name = workload::service_name(tenant_id);

        let service = match api.get(&name).await {
            Ok(service) => service,
            Err(err) => {
                let wrapped = Error::Platform { source: err };
                if wrapped.is_not_found() {
                    info!("service not found for tenant {}", tenant_id);
                    return Ok(None);
                }
                return Err(wrapped);
            }
        };

        let spec = service.spec.unwrap_or_default();
        Ok(Some(ServiceInfo {
            name,
            namespace: self.namespace.clone(),
            cluster_ip: spec.cluster_ip,
            ports: spec
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| ServicePortInfo {
                    port: p.port,
                    target_port: match p.target_port {
                        Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(i)) => i,
                        _ => p.port,
                    },
                })
                .collect(),
        }))
    }

    async fn get_endpoints(&self, tenant_id: &str) -> Result<Vec<PodAddress>> {
        let api: Api<corev1::Endpoints> = self.api();
        let name = workload::service_name(tenant_id);

        let endpoints = match api.get(&name).await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                let wrapped = Error::Platform { source: err };
                if wrapped.is_not_found() {
                    info!("endpoints not found for tenant {}", tenant_id);
                    return Ok(Vec::new());
                }
                return Err(wrapped);
            }
        };

        let mut addresses = Vec::new();
        for subset in endpoints.subsets.unwrap_or_default() {
            let port = subset
                .ports
                .as_ref()
                .and_then(|ports| ports.first())
                .map(|p| p.port as u16)
                .unwrap_or(80);
            for address in subset.addresses.unwrap_or_default() {
                addresses.push(PodAddress {
                    ip: address.ip,
                    port,
                    pod_name: address.target_ref.and_then(|r| r.name),
                });
            }
        }
        Ok(addresses)
    }

    async fn create_deployment(&self, tenant_id: &str, spec: &WorkloadSpec) -> Result<()> {
        let deployment = workload::new_deployment(tenant_id, &self.namespace, spec);
        self.create_idempotent("deployment", &deployment).await
    }

    async fn create_service(&self, tenant_id: &str, spec: &WorkloadSpec) -> Result<()> {
        let service = workload::new_service(tenant_id, &self.namespace, spec);
        self.create_idempotent("service", &service).await
    }

    async fn create_autoscaler(&self, tenant_id: &str, spec: &WorkloadSpec) -> Result<()> {
        let autoscaler = workload::new_autoscaler(tenant_id, &self.namespace, spec);
        self.create_idempotent("autoscaler", &autoscaler).await
    }

    async fn scale_deployment(&self, tenant_id: &str, replicas: i32) -> Result<()> {
        let api: Api<appsv1::Deployment> = self.api();
        let name = workload::deployment_name(tenant_id);
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        with_retry("scale", self.retry_attempts, self.retry_delay, || async {
            api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .context(error::PlatformSnafu)?;
            Ok(())
        })
        .await?;
        info!("scaled deployment for tenant {} to {} replicas", tenant_id, replicas);
        Ok(())
    }

    async fn delete_deployment(&self, tenant_id: &str) -> Result<()> {
        self.delete_idempotent::<appsv1::Deployment>(
            "deployment",
            &workload::deployment_name(tenant_id),
        )
        .await
    }

    async fn delete_service(&self, tenant_id: &str) -> Result<()> {
        self.delete_idempotent::<corev1::Service>("service", &workload::service_name(tenant_id))
            .await
    }

    async fn delete_autoscaler(&self, tenant_id: &str) -> Result<()> {
        self.delete_idempotent::<autoscalingv2::HorizontalPodAutoscaler>(
            "autoscaler",
            &workload::autoscaler_name(tenant_id),
        )
        .await
    }
}
