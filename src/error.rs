//! Error types for sparkops operations

use thiserror::Error;

/// Main error type for cluster operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A named resource (or cluster) does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind, e.g. `deployment`
        kind: &'static str,
        /// Resource name
        name: String,
    },

    /// A multi-resource action where some but not all mutations succeeded.
    ///
    /// Nothing is rolled back; `failed` identifies each mutation that did
    /// not land so the caller can see what remains of the cluster.
    #[error("cluster {cluster}: {}/{total} mutations failed: {}", failed.len(), failed.join("; "))]
    Partial {
        /// Cluster the action targeted
        cluster: String,
        /// Total number of mutations attempted
        total: usize,
        /// One `<kind> <name>: <reason>` line per failed mutation
        failed: Vec<String>,
    },
}

impl Error {
    /// Create a not-found error for the given resource
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a partial-failure error for a multi-resource action
    pub fn partial(cluster: impl Into<String>, total: usize, failed: Vec<String>) -> Self {
        Self::Partial {
            cluster: cluster.into(),
            total,
            failed,
        }
    }

    /// Whether this error means the target resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_identifies_the_resource() {
        let err = Error::not_found("deployment", "demo-w");
        assert_eq!(err.to_string(), "deployment demo-w not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn partial_failure_names_every_failed_mutation() {
        let err = Error::partial(
            "demo",
            6,
            vec![
                "service demo-ui: gateway timeout".to_string(),
                "deployment demo-m: forbidden".to_string(),
            ],
        );
        let message = err.to_string();
        assert!(message.contains("cluster demo"));
        assert!(message.contains("2/6"));
        assert!(message.contains("service demo-ui: gateway timeout"));
        assert!(message.contains("deployment demo-m: forbidden"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn kube_api_404_counts_as_not_found() {
        let err = Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "configmaps \"demo-config\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(err.is_not_found());
    }
}
