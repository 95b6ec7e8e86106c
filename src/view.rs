//! Pure aggregation of pods and services into cluster summaries
//!
//! [`build_cluster_view`] is re-run against the complete latest snapshots on
//! every update; nothing here is cached, diffed, or patched incrementally.
//! Missing or malformed fields degrade to "no match" rather than failing -
//! this code runs on every live event and must never take the panel down.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{Pod, Service};

use crate::selector;
use crate::{LABEL_CLUSTER, LABEL_ROLE, ROLE_MASTER, ROLE_WEBUI, ROLE_WORKER, SPARK_MASTER_PORT};

/// Phase value a healthy pod reports
const PHASE_RUNNING: &str = "Running";

/// Derived health of one cluster, computed on demand and never stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterStatus {
    /// Both roles present but no pods observed yet
    Starting,
    /// Every master and worker pod reports the running phase
    Running,
    /// Raw phase of a pod that is not running (e.g. `Pending`, `Failed`)
    Phase(String),
    /// The cluster lacks a master or worker pod entirely
    Error,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterStatus::Starting => f.write_str("Starting"),
            ClusterStatus::Running => f.write_str("Running"),
            ClusterStatus::Phase(phase) => f.write_str(phase),
            ClusterStatus::Error => f.write_str("Error"),
        }
    }
}

/// Pods and services classified under one (cluster, role) pair
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleGroup {
    /// Pods carrying this cluster/role label pair, keyed by name
    pub pods: BTreeMap<String, Pod>,
    /// Services associated with this cluster/role, keyed by name
    pub services: BTreeMap<String, Service>,
}

/// One cluster's resources, grouped by role
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cluster {
    roles: BTreeMap<String, RoleGroup>,
}

impl Cluster {
    /// The group for `role`, if any resource was classified under it
    pub fn role(&self, role: &str) -> Option<&RoleGroup> {
        self.roles.get(role)
    }

    /// Derived cluster status.
    ///
    /// A cluster without at least one master pod and one worker pod is
    /// `Error`. Otherwise every worker pod is scanned, then every master
    /// pod; the last non-running phase observed wins, a quirk inherited
    /// from the imperative original (masters can overwrite a worker's
    /// phase). All pods running means `Running`; `Starting` is the
    /// fallback when no pod was scanned at all.
    pub fn status(&self) -> ClusterStatus {
        let masters = self.role(ROLE_MASTER).filter(|g| !g.pods.is_empty());
        let workers = self.role(ROLE_WORKER).filter(|g| !g.pods.is_empty());
        let (Some(masters), Some(workers)) = (masters, workers) else {
            return ClusterStatus::Error;
        };

        let mut seen_pod = false;
        let mut stalled_phase = None;
        for pod in workers.pods.values().chain(masters.pods.values()) {
            seen_pod = true;
            let phase = pod
                .status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                .unwrap_or_default();
            if phase != PHASE_RUNNING {
                stalled_phase = Some(phase.to_string());
            }
        }

        match stalled_phase {
            Some(phase) => ClusterStatus::Phase(phase),
            None if seen_pod => ClusterStatus::Running,
            None => ClusterStatus::Starting,
        }
    }

    /// Connection string for the cluster's master, `spark://<svc>:7077`.
    ///
    /// Scans the master role's services for one exposing the Spark master
    /// port; returns an empty string when none does. Services without ports
    /// are skipped rather than treated as errors.
    pub fn master_url(&self) -> String {
        let Some(masters) = self.role(ROLE_MASTER) else {
            return String::new();
        };
        for (name, service) in &masters.services {
            let ports = service.spec.as_ref().and_then(|spec| spec.ports.as_ref());
            let exposes_master = ports
                .map(|ports| ports.iter().any(|p| p.port == SPARK_MASTER_PORT))
                .unwrap_or(false);
            if exposes_master {
                return format!("spark://{name}:{SPARK_MASTER_PORT}");
            }
        }
        String::new()
    }

    /// Number of live worker pods
    pub fn worker_count(&self) -> usize {
        self.role(ROLE_WORKER).map_or(0, |group| group.pods.len())
    }
}

/// All managed clusters derived from the latest snapshots
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterView {
    clusters: BTreeMap<String, Cluster>,
}

impl ClusterView {
    /// One cluster by name
    pub fn get(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// Iterate clusters in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cluster)> {
        self.clusters.iter()
    }

    /// Number of clusters in the view
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether the view contains no clusters
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    fn group_mut(&mut self, cluster: &str, role: &str) -> &mut RoleGroup {
        self.clusters
            .entry(cluster.to_string())
            .or_default()
            .roles
            .entry(role.to_string())
            .or_default()
    }
}

/// Regroup complete pod/service snapshots into a fresh [`ClusterView`].
///
/// Pods without the cluster label are ignored; the rest are bucketed by
/// their own cluster/role labels. A pod's first matching service (name
/// order, equality selector) is recorded under the same bucket - if several
/// services match, only the first wins, a known limitation of the grouping.
/// Web-UI services are bucketed by their own labels since no pod backs them.
///
/// Deterministic for fixed inputs: both snapshots are ordered maps, so
/// iteration order - and with it the first-match association - never varies
/// between calls.
pub fn build_cluster_view(
    pods: &BTreeMap<String, Pod>,
    services: &BTreeMap<String, Service>,
) -> ClusterView {
    let mut view = ClusterView::default();

    for (pod_name, pod) in pods {
        let labels = pod.metadata.labels.as_ref();
        let Some(cluster) = labels.and_then(|l| l.get(LABEL_CLUSTER)) else {
            continue;
        };
        let role = labels
            .and_then(|l| l.get(LABEL_ROLE))
            .cloned()
            .unwrap_or_default();

        let matched = services.iter().find(|(_, service)| {
            let svc_selector = service.spec.as_ref().and_then(|spec| spec.selector.as_ref());
            selector::matches(svc_selector, labels)
        });

        let group = view.group_mut(cluster, &role);
        if let Some((svc_name, service)) = matched {
            group.services.insert(svc_name.clone(), service.clone());
        }
        group.pods.insert(pod_name.clone(), pod.clone());
    }

    for (svc_name, service) in services {
        let labels = service.metadata.labels.as_ref();
        if labels.and_then(|l| l.get(LABEL_ROLE)).map(String::as_str) != Some(ROLE_WEBUI) {
            continue;
        }
        let Some(cluster) = labels.and_then(|l| l.get(LABEL_CLUSTER)) else {
            continue;
        };
        view.group_mut(cluster, ROLE_WEBUI)
            .services
            .insert(svc_name.clone(), service.clone());
    }

    view
}
