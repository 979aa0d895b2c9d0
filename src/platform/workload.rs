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

//! Builders for the Kubernetes objects that make up one tenant workload:
//! Deployment, ClusterIP Service and horizontal autoscaler.

use k8s_openapi::api::apps::v1;
use k8s_openapi::api::autoscaling::v2 as autoscalingv2;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr;
use std::collections::BTreeMap;

use super::WorkloadSpec;

const APP_LABEL: &str = "tenant-backend";
const MANAGED_BY: &str = "gateway";

pub fn deployment_name(tenant_id: &str) -> String {
    format!("tenant-backend-dep-{tenant_id}")
}

pub fn service_name(tenant_id: &str) -> String {
    format!("tenant-backend-svc-{tenant_id}")
}

pub fn autoscaler_name(tenant_id: &str) -> String {
    format!("tenant-backend-hpa-{tenant_id}")
}

fn common_labels(tenant_id: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(tenant_id);
    labels.insert("app.kubernetes.io/managed-by".to_owned(), MANAGED_BY.to_owned());
    labels
}

fn selector_labels(tenant_id: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_owned(), APP_LABEL.to_owned());
    labels.insert("tenant".to_owned(), tenant_id.to_owned());
    labels
}

fn health_probe(path: &str, port: i32, initial_delay: i32, period: i32) -> corev1::Probe {
    corev1::Probe {
        http_get: Some(corev1::HTTPGetAction {
            path: Some(path.to_owned()),
            port: intstr::IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..Default::default()
    }
}

fn resource_requirements(spec: &WorkloadSpec) -> corev1::ResourceRequirements {
    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_owned(), Quantity(spec.cpu_request.clone()));
    requests.insert("memory".to_owned(), Quantity(spec.memory_request.clone()));

    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_owned(), Quantity(spec.cpu_limit.clone()));
    limits.insert("memory".to_owned(), Quantity(spec.memory_limit.clone()));

    corev1::ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

pub fn new_deployment(tenant_id: &str, namespace: &str, spec: &WorkloadSpec) -> v1::Deployment {
    let env_vars = vec![corev1::EnvVar {
        name: "TENANT_ID".to_owned(),
        value: Some(tenant_id.to_owned()),
        ..Default::default()
    }];

    v1::Deployment {
        metadata: metav1::ObjectMeta {
            name: Some(deployment_name(tenant_id)),
            namespace: Some(namespace.to_owned()),
            labels: Some(common_labels(tenant_id)),
            ..Default::default()
        },
        spec: Some(v1::DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: metav1::LabelSelector {
                match_labels: Some(selector_labels(tenant_id)),
                ..Default::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(selector_labels(tenant_id)),
                    ..Default::default()
                }),
                spec: Some(corev1::PodSpec {
                    containers: vec![corev1::Container {
                        name: APP_LABEL.to_owned(),
                        image: Some(spec.image.clone()),
                        ports: Some(vec![corev1::ContainerPort {
                            container_port: spec.backend_port,
                            ..Default::default()
                        }]),
                        env: Some(env_vars),
                        resources: Some(resource_requirements(spec)),
                        readiness_probe: Some(health_probe(
                            &spec.health_check_path,
                            spec.backend_port,
                            10,
                            5,
                        )),
                        liveness_probe: Some(health_probe(
                            &spec.health_check_path,
                            spec.backend_port,
                            30,
                            10,
                        )),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_service(tenant_id: &str, namespace: &str, spec: &WorkloadSpec) -> corev1::Service {
    corev1::Service {
        metadata: metav1::ObjectMeta {
            name: Some(service_name(tenant_id)),
            namespace: Some(namespace.to_owned()),
            labels: Some(common_labels(tenant_id)),
            ..Default::default()
        },
        spec: Some(corev1::ServiceSpec {
            type_: Some("ClusterIP".to_owned()),
            selector: Some(selector_labels(tenant_id)),
            ports: Some(vec![corev1::ServicePort {
                port: spec.service_port,
                target_port: Some(intstr::IntOrString::Int(spec.backend_port)),
                protocol: Some("TCP".to_owned()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn new_autoscaler(
    tenant_id: &str,
    namespace: &str,
    spec: &WorkloadSpec,
) -> autoscalingv2::HorizontalPodAutoscaler {
    autoscalingv2::HorizontalPodAutoscaler {
        metadata: metav1::ObjectMeta {
            name: Some(autoscaler_name(tenant_id)),
            namespace: Some(namespace.to_owned()),
            labels: Some(common_labels(tenant_id)),
            ..Default::default()
        },
        spec: Some(autoscalingv2::HorizontalPodAutoscalerSpec {
            scale_target_ref: autoscalingv2::CrossVersionObjectReference {
                api_version: Some("apps/v1".to_owned()),
                kind: "Deployment".to_owned(),
                name: deployment_name(tenant_id),
            },
            min_replicas: Some(spec.min_replicas),
            max_replicas: spec.max_replicas,
            metrics: Some(vec![autoscalingv2::MetricSpec {
                type_: "Resource".to_owned(),
                resource: Some(autoscalingv2::ResourceMetricSource {
                    name: "cpu".to_owned(),
                    target: autoscalingv2::MetricTarget {
                        type_: "Utilization".to_owned(),
                        average_utilization: Some(spec.cpu_target),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn spec() -> WorkloadSpec {
        WorkloadSpec::from_config(&GatewayConfig::from_env())
    }

    #[test]
    fn test_naming_scheme() {
        assert_eq!(deployment_name("t1"), "tenant-backend-dep-t1");
        assert_eq!(service_name("t1"), "tenant-backend-svc-t1");
        assert_eq!(autoscaler_name("t1"), "tenant-backend-hpa-t1");
    }

    #[test]
    fn test_deployment_selector_matches_pod_labels() {
        let dep = new_deployment("t1", "tenant-backends", &spec());
        let spec = dep.spec.unwrap_or_default();
        let selector = spec.selector.match_labels.unwrap_or_default();
        let pod_labels = spec
            .template
            .metadata
            .and_then(|m| m.labels)
            .unwrap_or_default();
        assert_eq!(selector, pod_labels);
        assert_eq!(selector.get("tenant").map(String::as_str), Some("t1"));
    }

    #[test]
    fn test_service_targets_backend_port() {
        let svc = new_service("t1", "tenant-backends", &spec());
        let ports = svc
            .spec
            .and_then(|s| s.ports)
            .unwrap_or_default();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 80);
        assert_eq!(
            ports[0].target_port,
            Some(intstr::IntOrString::Int(8080))
        );
    }

    #[test]
    fn test_autoscaler_targets_deployment() {
        let hpa = new_autoscaler("t1", "tenant-backends", &spec());
        let hpa_spec = hpa.spec.unwrap_or_default();
        assert_eq!(hpa_spec.scale_target_ref.name, "tenant-backend-dep-t1");
        assert_eq!(hpa_spec.min_replicas, Some(1));
        assert_eq!(hpa_spec.max_replicas, 3);
    }
}
