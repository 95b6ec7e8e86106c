//! Sparkops - control-panel backend for Spark clusters on Kubernetes
//!
//! Sparkops lets a user create, scale, monitor, and delete Spark cluster
//! workloads through a small JSON/HTTP API. Two components do the real work:
//!
//! - The **live aggregator** ([`view`]) regroups watched pod and service
//!   snapshots into per-cluster, per-role buckets and derives a health
//!   status, a reachable master endpoint, and a worker count. It is a pure
//!   function over full snapshots, re-run on every update.
//! - The **lifecycle orchestrator** ([`orchestrator`]) turns a cluster
//!   intent (create/scale/delete) into a coordinated set of Kubernetes
//!   mutations, with correct ordering inside the delete sweep and explicit
//!   partial-failure reporting instead of rollback.
//!
//! # Modules
//!
//! - [`view`] - Pure aggregation of pods/services into cluster summaries
//! - [`selector`] - Label-selector matching
//! - [`workload`] - Deployment/Service descriptor construction
//! - [`orchestrator`] - Cluster lifecycle actions over the remote-API seam
//! - [`client`] - Production implementation of the remote-API seam
//! - [`registry`] - Watch-fed snapshot cache and current cluster view
//! - [`http`] - The UI-facing HTTP API
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod client;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod registry;
pub mod selector;
pub mod view;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Wire Contract Constants
// =============================================================================
// Label keys, role values, ports, and naming conventions shared between the
// resources the orchestrator creates and the aggregator's classification.
// Changing any of these orphans already-deployed clusters.

/// Label key identifying which cluster a resource belongs to
pub const LABEL_CLUSTER: &str = "cluster-id";

/// Label key identifying the part a resource plays within a cluster
pub const LABEL_ROLE: &str = "role";

/// Pod-template label linking a pod back to the deployment that owns it
pub const LABEL_DEPLOYMENT: &str = "deployment";

/// Role value for the Spark master
pub const ROLE_MASTER: &str = "master";

/// Role value for Spark workers
pub const ROLE_WORKER: &str = "worker";

/// Role value for the cluster web UI service (no backing pods of its own)
pub const ROLE_WEBUI: &str = "webui";

/// Port the Spark master listens on for cluster traffic
pub const SPARK_MASTER_PORT: i32 = 7077;

/// Port the master serves its web UI (and probes) on
pub const SPARK_UI_PORT: i32 = 8080;

/// Port workers serve their web UI (and liveness probe) on
pub const SPARK_WORKER_UI_PORT: i32 = 8081;

/// Suffix of the master deployment name (`<cluster>-m`)
pub const MASTER_SUFFIX: &str = "-m";

/// Suffix of the worker deployment name (`<cluster>-w`)
pub const WORKER_SUFFIX: &str = "-w";

/// Suffix of the web UI service name (`<cluster>-ui`)
pub const UI_SUFFIX: &str = "-ui";

/// Spark runtime image used for both master and worker containers
pub const SPARK_IMAGE: &str = "docker.io/radanalyticsio/openshift-spark:latest";

/// Mount path for per-role Spark config maps, exported as `SPARK_CONF_DIR`
pub const SPARK_CONF_DIR: &str = "/etc/spark-configs";

/// Shared config-map key holding the default worker count
pub const CONFIG_KEY_WORKER_COUNT: &str = "workercount";

/// Shared config-map key naming the master's per-role config map
pub const CONFIG_KEY_MASTER_CONFIG: &str = "sparkmasterconfig";

/// Shared config-map key naming the workers' per-role config map
pub const CONFIG_KEY_WORKER_CONFIG: &str = "sparkworkerconfig";
