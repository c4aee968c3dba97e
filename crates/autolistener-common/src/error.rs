//! Error types for the gateway-auto-listener controller
//!
//! Every failure that aborts a reconciliation pass is one of these variants.
//! The controller never retries internally; `is_retryable` and the variant
//! drive the requeue delay chosen by the error policy.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The API server rejected a write because the object changed since it was read
    #[error("conflict writing {kind} {name}: object was modified concurrently")]
    Conflict {
        /// Resource kind (Gateway, HTTPRoute)
        kind: String,
        /// Namespaced name of the object
        name: String,
    },

    /// Namespace lookup failed while evaluating hostname policy
    #[error("failed to get namespace {namespace}: {source}")]
    NamespaceLookup {
        /// Namespace that could not be read
        namespace: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Invalid controller configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "client")
        context: String,
    },
}

impl Error {
    /// Create a conflict error for the given kind and object name
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap a failed namespace lookup
    pub fn namespace_lookup(namespace: impl Into<String>, source: kube::Error) -> Self {
        Self::NamespaceLookup {
            namespace: namespace.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Conflicts and namespace lookups are always retried against fresh
    /// snapshots. Kubernetes 4xx responses other than 409 and 429 need a
    /// change somewhere else before a retry can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    ae.code == 409 || ae.code == 429 || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::Conflict { .. } => true,
            Error::NamespaceLookup { .. } => true,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True when the failure was an optimistic-concurrency rejection
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            _ => false,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn conflict_is_retryable_and_detected() {
        let err = Error::conflict("Gateway", "nginx-gateway/default");
        assert!(err.is_retryable());
        assert!(err.is_conflict());
        assert!(err.to_string().contains("nginx-gateway/default"));
    }

    #[test]
    fn kube_409_counts_as_conflict() {
        let err = Error::from(api_error(409));
        assert!(err.is_conflict());
        assert!(err.is_retryable());
    }

    #[test]
    fn kube_client_errors_are_not_retryable() {
        assert!(!Error::from(api_error(403)).is_retryable());
        assert!(!Error::from(api_error(422)).is_retryable());
        assert!(Error::from(api_error(429)).is_retryable());
        assert!(Error::from(api_error(503)).is_retryable());
    }

    #[test]
    fn namespace_lookup_is_retryable() {
        let err = Error::namespace_lookup("tenant-a", api_error(500));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("tenant-a"));
    }

    #[test]
    fn config_and_serialization_are_permanent() {
        assert!(!Error::config("gateway name must not be empty").is_retryable());
        assert!(!Error::serialization("bad json").is_retryable());
    }

    #[test]
    fn internal_error_context() {
        let err = Error::internal_with_context("reconciler", "route has no namespace");
        assert_eq!(err.context(), Some("reconciler"));
        assert!(err.to_string().contains("[reconciler]"));

        let err = Error::internal("boom");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
    }
}
