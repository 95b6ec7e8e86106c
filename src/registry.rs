//! Watch-fed snapshot cache and current cluster view
//!
//! Keeps the latest complete pod and service snapshots for one namespace
//! and rebuilds the [`ClusterView`] wholesale whenever either collection
//! changes. The view is only produced once both collections have delivered
//! their initial listing; until then readers see an empty view.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::view::{build_cluster_view, ClusterView};

#[derive(Default)]
struct Snapshots {
    pods: Option<BTreeMap<String, Pod>>,
    services: Option<BTreeMap<String, Service>>,
    view: ClusterView,
}

impl Snapshots {
    fn rebuild(&mut self) {
        if let (Some(pods), Some(services)) = (&self.pods, &self.services) {
            self.view = build_cluster_view(pods, services);
        }
    }
}

/// Shared handle on the live cluster view
#[derive(Clone, Default)]
pub struct ClusterRegistry {
    inner: Arc<RwLock<Snapshots>>,
}

impl ClusterRegistry {
    /// Create an empty registry; the view stays empty until both
    /// collections have been snapshotted
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current cluster view
    pub fn view(&self) -> ClusterView {
        self.read().view.clone()
    }

    /// Watch the pod collection forever, feeding the view
    pub async fn watch_pods(&self, api: Api<Pod>) {
        watch_snapshots(api, "pods", |snapshot| self.set_pods(snapshot)).await;
    }

    /// Watch the service collection forever, feeding the view
    pub async fn watch_services(&self, api: Api<Service>) {
        watch_snapshots(api, "services", |snapshot| self.set_services(snapshot)).await;
    }

    pub(crate) fn set_pods(&self, pods: BTreeMap<String, Pod>) {
        let mut snapshots = self.write();
        snapshots.pods = Some(pods);
        snapshots.rebuild();
    }

    pub(crate) fn set_services(&self, services: BTreeMap<String, Service>) {
        let mut snapshots = self.write();
        snapshots.services = Some(services);
        snapshots.rebuild();
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshots> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshots> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fold one watcher event into the snapshot under construction.
///
/// The init phase buffers into `pending` and swaps it in atomically on
/// completion, so a relist never exposes a half-filled snapshot. Returns
/// whether the published snapshot changed.
fn apply_event<K: ResourceExt>(
    current: &mut BTreeMap<String, K>,
    pending: &mut Option<BTreeMap<String, K>>,
    event: Event<K>,
) -> bool {
    match event {
        Event::Init => {
            *pending = Some(BTreeMap::new());
            false
        }
        Event::InitApply(resource) => {
            if let Some(buffer) = pending.as_mut() {
                buffer.insert(resource.name_any(), resource);
            }
            false
        }
        Event::InitDone => match pending.take() {
            Some(buffer) => {
                *current = buffer;
                true
            }
            None => false,
        },
        Event::Apply(resource) => {
            current.insert(resource.name_any(), resource);
            true
        }
        Event::Delete(resource) => {
            current.remove(&resource.name_any());
            true
        }
    }
}

async fn watch_snapshots<K, F>(api: Api<K>, collection: &str, publish: F)
where
    K: kube::Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
    F: Fn(BTreeMap<String, K>),
{
    let stream = watcher::watcher(api, watcher::Config::default());
    let mut stream = std::pin::pin!(stream);

    let mut current = BTreeMap::new();
    let mut pending = None;

    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                if apply_event(&mut current, &mut pending, event) {
                    debug!(%collection, resources = current.len(), "snapshot updated");
                    publish(current.clone());
                }
            }
            Err(error) => {
                warn!(%collection, %error, "watch error, retrying");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::{LABEL_CLUSTER, LABEL_ROLE, ROLE_MASTER, ROLE_WORKER};

    fn pod(name: &str, cluster: &str, role: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([
                    (LABEL_CLUSTER.to_string(), cluster.to_string()),
                    (LABEL_ROLE.to_string(), role.to_string()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn view_stays_empty_until_both_collections_arrive() {
        let registry = ClusterRegistry::new();
        registry.set_pods(BTreeMap::from([(
            "demo-m-1".to_string(),
            pod("demo-m-1", "demo", ROLE_MASTER),
        )]));
        assert!(registry.view().is_empty());

        registry.set_services(BTreeMap::new());
        assert_eq!(registry.view().len(), 1);
    }

    #[test]
    fn updated_snapshot_replaces_the_view() {
        let registry = ClusterRegistry::new();
        registry.set_pods(BTreeMap::from([
            ("demo-m-1".to_string(), pod("demo-m-1", "demo", ROLE_MASTER)),
            ("demo-w-1".to_string(), pod("demo-w-1", "demo", ROLE_WORKER)),
        ]));
        registry.set_services(BTreeMap::new());
        assert_eq!(registry.view().get("demo").unwrap().worker_count(), 1);

        registry.set_pods(BTreeMap::from([(
            "demo-m-1".to_string(),
            pod("demo-m-1", "demo", ROLE_MASTER),
        )]));
        assert_eq!(registry.view().get("demo").unwrap().worker_count(), 0);
    }

    #[test]
    fn init_events_buffer_until_done() {
        let mut current = BTreeMap::new();
        let mut pending = None;

        assert!(!apply_event(&mut current, &mut pending, Event::Init));
        assert!(!apply_event(
            &mut current,
            &mut pending,
            Event::InitApply(pod("demo-m-1", "demo", ROLE_MASTER)),
        ));
        assert!(current.is_empty());

        assert!(apply_event(&mut current, &mut pending, Event::InitDone));
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn relist_replaces_the_snapshot_wholesale() {
        let mut current = BTreeMap::from([(
            "stale".to_string(),
            pod("stale", "demo", ROLE_WORKER),
        )]);
        let mut pending = None;

        apply_event(&mut current, &mut pending, Event::Init);
        apply_event(
            &mut current,
            &mut pending,
            Event::InitApply(pod("fresh", "demo", ROLE_WORKER)),
        );
        apply_event(&mut current, &mut pending, Event::InitDone);

        assert!(!current.contains_key("stale"));
        assert!(current.contains_key("fresh"));
    }

    #[test]
    fn apply_and_delete_keep_the_snapshot_complete() {
        let mut current = BTreeMap::new();
        let mut pending = None;

        assert!(apply_event(
            &mut current,
            &mut pending,
            Event::Apply(pod("demo-w-1", "demo", ROLE_WORKER)),
        ));
        assert!(current.contains_key("demo-w-1"));

        assert!(apply_event(
            &mut current,
            &mut pending,
            Event::Delete(pod("demo-w-1", "demo", ROLE_WORKER)),
        ));
        assert!(current.is_empty());
    }
}
