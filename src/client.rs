//! Production implementation of the remote-API seam
//!
//! Thin, namespace-scoped wrappers around `kube::Api` handles. No cluster
//! logic lives here; the orchestrator decides, this module only carries
//! mutations to the API server.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

use crate::orchestrator::ResourceClient;
use crate::{Error, Result};

/// [`ResourceClient`] backed by a real Kubernetes client
pub struct KubeResourceClient {
    deployments: Api<Deployment>,
    services: Api<Service>,
    replica_sets: Api<ReplicaSet>,
    config_maps: Api<ConfigMap>,
}

impl KubeResourceClient {
    /// Create a client managing resources in the given namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            deployments: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client.clone(), namespace),
            replica_sets: Api::namespaced(client.clone(), namespace),
            config_maps: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_config_map(&self, name: &str) -> Result<ConfigMap> {
        Ok(self.config_maps.get(name).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.deployments
            .create(&PostParams::default(), deployment)
            .await?;
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        self.services.create(&PostParams::default(), service).await?;
        Ok(())
    }

    async fn scale_deployment(&self, name: &str, replicas: i32) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        match self
            .deployments
            .patch_scale(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::not_found("deployment", name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_replica_sets(&self) -> Result<Vec<ReplicaSet>> {
        Ok(self
            .replica_sets
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn scale_replica_set(&self, name: &str, replicas: i32) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.replica_sets
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn delete_replica_set(&self, name: &str) -> Result<()> {
        self.replica_sets
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_deployment(&self, name: &str) -> Result<()> {
        self.deployments
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        self.services.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
