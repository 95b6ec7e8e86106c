//! Deployment and Service descriptor construction
//!
//! Builders for the four resources that make up one Spark cluster: a master
//! deployment, a worker deployment, the master service (port 7077), and the
//! web-UI service (port 8080). Descriptors are built in memory, submitted
//! once, and never read back; the labels they carry are what lets the
//! aggregator classify the resulting pods and services later.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::{
    LABEL_CLUSTER, LABEL_DEPLOYMENT, LABEL_ROLE, MASTER_SUFFIX, ROLE_MASTER, ROLE_WEBUI,
    ROLE_WORKER, SPARK_CONF_DIR, SPARK_IMAGE, SPARK_MASTER_PORT, SPARK_UI_PORT,
    SPARK_WORKER_UI_PORT, UI_SUFFIX, WORKER_SUFFIX,
};

fn cluster_labels(cluster: &str, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_CLUSTER.to_string(), cluster.to_string()),
        (LABEL_ROLE.to_string(), role.to_string()),
    ])
}

fn http_probe(port: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(port),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        timeout_seconds: Some(1),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Shared deployment shape for both roles.
///
/// Master containers get liveness and readiness probes on the UI port;
/// workers only a liveness probe on theirs (a worker that lost its master
/// shows unhealthy, it does not get pulled from a service rotation). A
/// per-role config map, when given, is mounted read-only and announced to
/// Spark through `SPARK_CONF_DIR`.
fn spark_deployment(
    cluster: &str,
    role: &str,
    replicas: i32,
    ports: Vec<ContainerPort>,
    config_map: Option<&str>,
) -> Deployment {
    let suffix = if role == ROLE_MASTER {
        MASTER_SUFFIX
    } else {
        WORKER_SUFFIX
    };
    let name = format!("{cluster}{suffix}");

    let mut env = vec![env_var("SPARK_CLUSTER_NAME", cluster)];
    if role == ROLE_WORKER {
        env.push(env_var(
            "SPARK_MASTER_ADDRESS",
            format!("spark://{cluster}:{SPARK_MASTER_PORT}"),
        ));
        env.push(env_var(
            "SPARK_MASTER_UI_ADDRESS",
            format!("http://{cluster}{UI_SUFFIX}:{SPARK_UI_PORT}"),
        ));
    }
    if config_map.is_some() {
        env.push(env_var("SPARK_CONF_DIR", SPARK_CONF_DIR));
    }

    let mut container = Container {
        name: name.clone(),
        image: Some(SPARK_IMAGE.to_string()),
        ports: Some(ports),
        env: Some(env),
        termination_message_path: Some("/dev/termination-log".to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    };
    if role == ROLE_MASTER {
        container.liveness_probe = Some(http_probe(SPARK_UI_PORT));
        container.readiness_probe = Some(http_probe(SPARK_UI_PORT));
    } else {
        container.liveness_probe = Some(http_probe(SPARK_WORKER_UI_PORT));
    }

    let mut volumes = None;
    if let Some(config_map) = config_map {
        container.volume_mounts = Some(vec![VolumeMount {
            name: config_map.to_string(),
            read_only: Some(true),
            mount_path: SPARK_CONF_DIR.to_string(),
            ..Default::default()
        }]);
        volumes = Some(vec![Volume {
            name: config_map.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                default_mode: Some(420),
                ..Default::default()
            }),
            ..Default::default()
        }]);
    }

    let labels = cluster_labels(cluster, role);
    let mut template_labels = labels.clone();
    template_labels.insert(LABEL_DEPLOYMENT.to_string(), name.clone());

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(template_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes,
                    restart_policy: Some("Always".to_string()),
                    termination_grace_period_seconds: Some(30),
                    dns_policy: Some("ClusterFirst".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Master deployment `<cluster>-m`, always a single replica
pub fn master_deployment(cluster: &str, config_map: Option<&str>) -> Deployment {
    let ports = vec![
        container_port("spark-webui", SPARK_UI_PORT),
        container_port("spark-master", SPARK_MASTER_PORT),
    ];
    spark_deployment(cluster, ROLE_MASTER, 1, ports, config_map)
}

/// Worker deployment `<cluster>-w` with the requested replica count
pub fn worker_deployment(cluster: &str, worker_count: i32, config_map: Option<&str>) -> Deployment {
    let ports = vec![container_port("spark-webui", SPARK_WORKER_UI_PORT)];
    spark_deployment(cluster, ROLE_WORKER, worker_count, ports, config_map)
}

/// One single-port service routed at the cluster's master pods.
///
/// Both cluster services select the master: the master process also serves
/// the web UI, so the UI service differs only in name, label role, and port.
fn spark_service(name: &str, cluster: &str, role: &str, port: i32) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(cluster_labels(cluster, role)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(cluster_labels(cluster, ROLE_MASTER)),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Master service `<cluster>` exposing the Spark master port
pub fn master_service(cluster: &str) -> Service {
    spark_service(cluster, cluster, ROLE_MASTER, SPARK_MASTER_PORT)
}

/// Web-UI service `<cluster>-ui` exposing the master's UI port
pub fn ui_service(cluster: &str) -> Service {
    spark_service(
        &format!("{cluster}{UI_SUFFIX}"),
        cluster,
        ROLE_WEBUI,
        SPARK_UI_PORT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(deployment: &Deployment) -> &Container {
        &deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
            .containers[0]
    }

    fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    #[test]
    fn master_deployment_shape() {
        let deployment = master_deployment("demo", None);
        assert_eq!(deployment.metadata.name.as_deref(), Some("demo-m"));

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap().get(LABEL_ROLE),
            Some(&ROLE_MASTER.to_string())
        );

        let container = container(&deployment);
        assert_eq!(container.image.as_deref(), Some(SPARK_IMAGE));
        let ports = container.ports.as_ref().unwrap();
        assert!(ports.iter().any(|p| p.container_port == SPARK_MASTER_PORT));
        assert!(ports.iter().any(|p| p.container_port == SPARK_UI_PORT));

        // Masters carry both probes, on the UI port.
        let liveness = container.liveness_probe.as_ref().unwrap();
        let readiness = container.readiness_probe.as_ref().unwrap();
        for probe in [liveness, readiness] {
            let http = probe.http_get.as_ref().unwrap();
            assert_eq!(http.port, IntOrString::Int(SPARK_UI_PORT));
            assert_eq!(probe.failure_threshold, Some(3));
        }

        // Masters know nothing about themselves via env.
        assert!(env_value(container, "SPARK_MASTER_ADDRESS").is_none());
        assert_eq!(env_value(container, "SPARK_CLUSTER_NAME"), Some("demo"));
    }

    #[test]
    fn worker_deployment_points_at_the_master() {
        let deployment = worker_deployment("demo", 3, None);
        assert_eq!(deployment.metadata.name.as_deref(), Some("demo-w"));
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(3));

        let container = container(&deployment);
        assert_eq!(
            env_value(container, "SPARK_MASTER_ADDRESS"),
            Some("spark://demo:7077")
        );
        assert_eq!(
            env_value(container, "SPARK_MASTER_UI_ADDRESS"),
            Some("http://demo-ui:8080")
        );

        // Workers get a liveness probe on their own UI port, no readiness.
        let liveness = container.liveness_probe.as_ref().unwrap();
        assert_eq!(
            liveness.http_get.as_ref().unwrap().port,
            IntOrString::Int(SPARK_WORKER_UI_PORT)
        );
        assert!(container.readiness_probe.is_none());
    }

    #[test]
    fn config_map_is_mounted_and_announced() {
        let deployment = worker_deployment("demo", 1, Some("worker-conf"));

        let pod_spec = deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap();
        let volume = &pod_spec.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, "worker-conf");
        assert_eq!(
            volume.config_map.as_ref().unwrap().name,
            "worker-conf"
        );

        let container = container(&deployment);
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, SPARK_CONF_DIR);
        assert_eq!(mount.read_only, Some(true));
        assert_eq!(env_value(container, "SPARK_CONF_DIR"), Some(SPARK_CONF_DIR));
    }

    #[test]
    fn no_config_map_means_no_volumes() {
        let deployment = worker_deployment("demo", 1, None);
        let pod_spec = deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap();
        assert!(pod_spec.volumes.is_none());
        assert!(env_value(container(&deployment), "SPARK_CONF_DIR").is_none());
    }

    #[test]
    fn pod_template_links_back_to_its_deployment() {
        let deployment = master_deployment("demo", None);
        let template_labels = deployment
            .spec
            .as_ref()
            .unwrap()
            .template
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .as_ref()
            .unwrap();
        assert_eq!(
            template_labels.get(LABEL_DEPLOYMENT),
            Some(&"demo-m".to_string())
        );
        assert_eq!(template_labels.get(LABEL_CLUSTER), Some(&"demo".to_string()));
    }

    #[test]
    fn services_select_master_pods() {
        let master = master_service("demo");
        let ui = ui_service("demo");

        assert_eq!(master.metadata.name.as_deref(), Some("demo"));
        assert_eq!(ui.metadata.name.as_deref(), Some("demo-ui"));

        for service in [&master, &ui] {
            let selector = service
                .spec
                .as_ref()
                .unwrap()
                .selector
                .as_ref()
                .unwrap();
            assert_eq!(selector.get(LABEL_ROLE), Some(&ROLE_MASTER.to_string()));
            assert_eq!(selector.get(LABEL_CLUSTER), Some(&"demo".to_string()));
        }

        let master_port = &master.spec.as_ref().unwrap().ports.as_ref().unwrap()[0];
        assert_eq!(master_port.port, SPARK_MASTER_PORT);
        let ui_port = &ui.spec.as_ref().unwrap().ports.as_ref().unwrap()[0];
        assert_eq!(ui_port.port, SPARK_UI_PORT);

        // The UI service is labeled webui so the aggregator buckets it
        // without any backing pods.
        assert_eq!(
            ui.metadata.labels.as_ref().unwrap().get(LABEL_ROLE),
            Some(&ROLE_WEBUI.to_string())
        );
    }
}
