//! Cluster lifecycle orchestration
//!
//! Translates a cluster intent (create/scale/delete) into the remote
//! mutations that realise it. Every action resolves to exactly one outcome:
//! success, or an error naming what failed. Multi-resource actions run
//! their mutations concurrently and report partial failures instead of
//! rolling back - a half-created or half-deleted cluster is a visible end
//! state the user acts on, not something this layer papers over.
//!
//! No mutual exclusion is attempted between concurrent actions on the same
//! cluster name; a racing scale and delete resolve at the API server under
//! its own consistency rules.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::workload;
use crate::{
    Error, Result, CONFIG_KEY_MASTER_CONFIG, CONFIG_KEY_WORKER_COUNT, CONFIG_KEY_WORKER_CONFIG,
    LABEL_CLUSTER, MASTER_SUFFIX, UI_SUFFIX, WORKER_SUFFIX,
};

/// Trait abstracting the remote resource primitives the orchestrator needs
///
/// Implemented over the real Kubernetes client in production and mocked in
/// tests. All operations are namespace-scoped by the implementation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch a config map by name
    async fn get_config_map(&self, name: &str) -> Result<ConfigMap>;

    /// Create a deployment from a descriptor
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Create a service from a descriptor
    async fn create_service(&self, service: &Service) -> Result<()>;

    /// Set a deployment's replica count through the scale subresource
    async fn scale_deployment(&self, name: &str, replicas: i32) -> Result<()>;

    /// List every replica set in the namespace
    async fn list_replica_sets(&self) -> Result<Vec<ReplicaSet>>;

    /// Set a replica set's replica count
    async fn scale_replica_set(&self, name: &str, replicas: i32) -> Result<()>;

    /// Delete a replica set by name
    async fn delete_replica_set(&self, name: &str) -> Result<()>;

    /// Delete a deployment by name
    async fn delete_deployment(&self, name: &str) -> Result<()>;

    /// Delete a service by name
    async fn delete_service(&self, name: &str) -> Result<()>;
}

/// A fully-formed cluster action request, consumed by one orchestrator call
///
/// Collecting these fields (and confirming destructive actions) is the UI
/// layer's job; by the time an intent reaches the orchestrator it is final.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClusterIntent {
    /// Cluster name, also the stem of every resource name
    pub name: String,
    /// Desired worker replica count; overrides the shared config's value
    pub worker_count: Option<i32>,
    /// Per-role config map for the master deployment
    pub master_config: Option<String>,
    /// Per-role config map for worker deployments
    pub worker_config: Option<String>,
    /// Shared config map consulted for defaults before explicit fields
    pub cluster_config: Option<String>,
}

/// Worker count and per-role configs after merging shared and explicit config
struct EffectiveConfig {
    worker_count: i32,
    master_config: Option<String>,
    worker_config: Option<String>,
}

/// Cluster lifecycle actions over a [`ResourceClient`]
pub struct ClusterLifecycle<C> {
    ops: C,
}

impl<C: ResourceClient> ClusterLifecycle<C> {
    /// Create a lifecycle orchestrator over the given resource client
    pub fn new(ops: C) -> Self {
        Self { ops }
    }

    /// Create all four resources of a new cluster.
    ///
    /// Resolves effective configuration first (see
    /// [`ClusterIntent::cluster_config`]), then submits the master and
    /// worker deployments and the master and web-UI services concurrently.
    /// Succeeds only if all four land; otherwise reports which did not,
    /// leaving the rest in place.
    pub async fn create(&self, intent: &ClusterIntent) -> Result<()> {
        let config = self.effective_config(intent).await;

        let master = workload::master_deployment(&intent.name, config.master_config.as_deref());
        let worker = workload::worker_deployment(
            &intent.name,
            config.worker_count,
            config.worker_config.as_deref(),
        );
        let master_svc = workload::master_service(&intent.name);
        let ui_svc = workload::ui_service(&intent.name);

        info!(
            cluster = %intent.name,
            workers = config.worker_count,
            "creating spark cluster"
        );
        let results = tokio::join!(
            self.ops.create_deployment(&master),
            self.ops.create_deployment(&worker),
            self.ops.create_service(&master_svc),
            self.ops.create_service(&ui_svc),
        );

        let name = |meta: &ObjectMeta| meta.name.clone().unwrap_or_default();
        let outcomes = [
            ("deployment", name(&master.metadata), results.0),
            ("deployment", name(&worker.metadata), results.1),
            ("service", name(&master_svc.metadata), results.2),
            ("service", name(&ui_svc.metadata), results.3),
        ];
        finish(&intent.name, outcomes)
    }

    /// Scale the cluster's worker deployment to `worker_count`.
    ///
    /// A single mutation against `<cluster>-w` through the platform's scale
    /// primitive; returns once the new replica count is acknowledged,
    /// without waiting for pods to become ready.
    pub async fn scale(&self, cluster: &str, worker_count: i32) -> Result<()> {
        let name = format!("{cluster}{WORKER_SUFFIX}");
        info!(%cluster, worker_count, "scaling spark cluster workers");
        self.ops.scale_deployment(&name, worker_count).await
    }

    /// Tear down every resource of a cluster.
    ///
    /// Runs six operations concurrently: a replica-set sweep per role, the
    /// two deployment deletions, and the two service deletions. Succeeds
    /// only if all six succeed; any failure surfaces as a partial outcome
    /// identifying what remains.
    pub async fn delete(&self, cluster: &str) -> Result<()> {
        let master_name = format!("{cluster}{MASTER_SUFFIX}");
        let worker_name = format!("{cluster}{WORKER_SUFFIX}");
        let ui_name = format!("{cluster}{UI_SUFFIX}");

        info!(%cluster, "deleting spark cluster");
        let results = tokio::join!(
            self.sweep_replica_sets(cluster, &master_name),
            self.sweep_replica_sets(cluster, &worker_name),
            self.ops.delete_deployment(&master_name),
            self.ops.delete_deployment(&worker_name),
            self.ops.delete_service(cluster),
            self.ops.delete_service(&ui_name),
        );

        let outcomes = [
            ("replica sets of", master_name.clone(), results.0),
            ("replica sets of", worker_name.clone(), results.1),
            ("deployment", master_name, results.2),
            ("deployment", worker_name, results.3),
            ("service", cluster.to_string(), results.4),
            ("service", ui_name, results.5),
        ];
        finish(cluster, outcomes)
    }

    /// Scale the deployment's current replica set to zero, then delete it.
    ///
    /// Several replica sets can coexist transiently after a deployment
    /// change, so the sweep cannot assume a name: it lists all of them,
    /// keeps the newest matching unit by creation timestamp, and deletes
    /// superseded ones best-effort as it goes. The newest unit is scaled
    /// to zero and only deleted once that update is acknowledged; deleting
    /// first would orphan pods past lifecycle termination. Finding no
    /// matching unit (already scaled away) is a no-op success.
    async fn sweep_replica_sets(&self, cluster: &str, deployment: &str) -> Result<()> {
        let sets = self.ops.list_replica_sets().await?;

        let mut current: Option<&ReplicaSet> = None;
        for set in &sets {
            if !backs_deployment(set, cluster, deployment) {
                continue;
            }
            let newer = match current {
                Some(newest) => supersedes(set, newest),
                None => true,
            };
            if !newer {
                continue;
            }
            if let Some(superseded) = current.replace(set) {
                let name = superseded.metadata.name.as_deref().unwrap_or_default();
                if let Err(error) = self.ops.delete_replica_set(name).await {
                    warn!(%name, %error, "failed to delete superseded replica set");
                }
            }
        }

        let Some(newest) = current else {
            debug!(%deployment, "no replica sets to sweep");
            return Ok(());
        };
        let name = newest.metadata.name.as_deref().unwrap_or_default();
        self.ops.scale_replica_set(name, 0).await?;
        self.ops.delete_replica_set(name).await?;
        Ok(())
    }

    /// Merge the shared config map's defaults with the intent's fields.
    ///
    /// Explicit intent fields win over config-map values. A missing or
    /// unreadable config map never fails the enclosing create: resolution
    /// falls back to the explicit fields alone.
    async fn effective_config(&self, intent: &ClusterIntent) -> EffectiveConfig {
        let mut worker_count = None;
        let mut master_config = None;
        let mut worker_config = None;

        if let Some(shared) = &intent.cluster_config {
            match self.ops.get_config_map(shared).await {
                Ok(config_map) => {
                    let data = config_map.data.unwrap_or_default();
                    worker_count = data
                        .get(CONFIG_KEY_WORKER_COUNT)
                        .and_then(|count| count.parse().ok());
                    master_config = data.get(CONFIG_KEY_MASTER_CONFIG).cloned();
                    worker_config = data.get(CONFIG_KEY_WORKER_CONFIG).cloned();
                }
                Err(error) => {
                    debug!(
                        config_map = %shared,
                        %error,
                        "shared config unavailable, using explicit parameters"
                    );
                }
            }
        }

        if intent.worker_count.is_some() {
            worker_count = intent.worker_count;
        }
        if intent.master_config.is_some() {
            master_config = intent.master_config.clone();
        }
        if intent.worker_config.is_some() {
            worker_config = intent.worker_config.clone();
        }

        EffectiveConfig {
            worker_count: worker_count.unwrap_or(1),
            master_config,
            worker_config,
        }
    }
}

/// Whether a replica set backs the named deployment of the named cluster
fn backs_deployment(set: &ReplicaSet, cluster: &str, deployment: &str) -> bool {
    let in_cluster = set
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_CLUSTER))
        .map(String::as_str)
        == Some(cluster);
    let name = set.metadata.name.as_deref().unwrap_or_default();
    in_cluster && name.starts_with(deployment)
}

/// Whether `candidate` was created strictly later than `newest`.
///
/// A unit without a creation timestamp never supersedes one that has one,
/// and between two timestampless units the first encountered stays.
fn supersedes(candidate: &ReplicaSet, newest: &ReplicaSet) -> bool {
    match (
        candidate.metadata.creation_timestamp.as_ref(),
        newest.metadata.creation_timestamp.as_ref(),
    ) {
        (Some(candidate), Some(newest)) => candidate.0 > newest.0,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Collapse per-mutation outcomes into one action result
fn finish<const N: usize>(cluster: &str, outcomes: [(&str, String, Result<()>); N]) -> Result<()> {
    let failed: Vec<String> = outcomes
        .into_iter()
        .filter_map(|(kind, name, result)| {
            result.err().map(|error| format!("{kind} {name}: {error}"))
        })
        .collect();
    if failed.is_empty() {
        info!(%cluster, "cluster action complete");
        Ok(())
    } else {
        Err(Error::partial(cluster, N, failed))
    }
}
