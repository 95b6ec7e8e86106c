//! The UI-facing HTTP API
//!
//! A small JSON surface over the two core components: reads come from the
//! registry's current view, writes go through the lifecycle orchestrator.
//! Confirmation of destructive actions is the front end's job; by the time
//! a request lands here it is treated as a fully-formed intent.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{ClusterIntent, ClusterLifecycle, ResourceClient};
use crate::registry::ClusterRegistry;
use crate::view::Cluster;
use crate::Error;

/// Shared state behind every handler
pub struct AppState<C> {
    registry: ClusterRegistry,
    lifecycle: ClusterLifecycle<C>,
}

impl<C> AppState<C> {
    /// Bundle the live registry and the lifecycle orchestrator
    pub fn new(registry: ClusterRegistry, lifecycle: ClusterLifecycle<C>) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }
}

/// One cluster as shown in the panel's list
#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    /// Cluster name
    pub name: String,
    /// Derived status (`Starting`, `Running`, a raw phase, or `Error`)
    pub status: String,
    /// Number of live worker pods
    pub workers: usize,
    /// Master connection string, empty when unreachable
    pub master_url: String,
}

/// Body of a scale request
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    /// Desired worker replica count
    pub worker_count: i32,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_GATEWAY
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

fn summarize(name: &str, cluster: &Cluster) -> ClusterSummary {
    ClusterSummary {
        name: name.to_string(),
        status: cluster.status().to_string(),
        workers: cluster.worker_count(),
        master_url: cluster.master_url(),
    }
}

async fn list_clusters<C: ResourceClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<Vec<ClusterSummary>> {
    let view = state.registry.view();
    Json(
        view.iter()
            .map(|(name, cluster)| summarize(name, cluster))
            .collect(),
    )
}

async fn get_cluster<C: ResourceClient>(
    State(state): State<Arc<AppState<C>>>,
    Path(name): Path<String>,
) -> Result<Json<ClusterSummary>, Error> {
    let view = state.registry.view();
    let cluster = view
        .get(&name)
        .ok_or_else(|| Error::not_found("cluster", name.clone()))?;
    Ok(Json(summarize(&name, cluster)))
}

async fn create_cluster<C: ResourceClient>(
    State(state): State<Arc<AppState<C>>>,
    Json(intent): Json<ClusterIntent>,
) -> Result<Response, Error> {
    state.lifecycle.create(&intent).await?;
    let body = Json(serde_json::json!({ "name": intent.name }));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn scale_cluster<C: ResourceClient>(
    State(state): State<Arc<AppState<C>>>,
    Path(name): Path<String>,
    Json(request): Json<ScaleRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    state.lifecycle.scale(&name, request.worker_count).await?;
    Ok(Json(serde_json::json!({
        "name": name,
        "worker_count": request.worker_count,
    })))
}

async fn delete_cluster<C: ResourceClient>(
    State(state): State<Arc<AppState<C>>>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, Error> {
    state.lifecycle.delete(&name).await?;
    Ok(Json(serde_json::json!({ "name": name })))
}

/// Build the control-panel router over the given state
pub fn router<C: ResourceClient + 'static>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route(
            "/api/clusters",
            get(list_clusters::<C>).post(create_cluster::<C>),
        )
        .route(
            "/api/clusters/{name}",
            get(get_cluster::<C>).delete(delete_cluster::<C>),
        )
        .route("/api/clusters/{name}/scale", post(scale_cluster::<C>))
        .with_state(state)
}
