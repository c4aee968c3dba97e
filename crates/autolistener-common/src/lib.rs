//! Common types for gateway-auto-listener: errors, events, telemetry and
//! the Gateway API resources the controller reads and patches.

#![deny(missing_docs)]

pub mod error;
pub mod events;
pub mod kube_utils;
pub mod leader_election;
pub mod metrics;
pub mod network;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name reported on Events and used as the server-side field manager
pub const CONTROLLER_NAME: &str = "gateway-auto-listener";

/// Finalizer held by every managed HTTPRoute until its listeners are removed
pub const ROUTE_FINALIZER: &str = "gateway-auto-listener/finalizer";

/// Finalizer used by earlier deployments under the old project name.
///
/// Routes still carrying it are migrated to [`ROUTE_FINALIZER`].
pub const LEGACY_ROUTE_FINALIZER: &str = "httproute-cert-controller.itsh.dev/finalizer";

/// cert-manager annotation selecting a ClusterIssuer
pub const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

/// cert-manager annotation selecting a namespaced Issuer
pub const ISSUER_ANNOTATION: &str = "cert-manager.io/issuer";

/// Route annotation recording the listener names created for that route
pub const MANAGED_LISTENERS_ANNOTATION: &str = "gateway-auto-listener/managed-listeners";

/// Label placed on the Gateway once the controller has written to it
pub const LABEL_MANAGED_BY: &str = "gateway-auto-listener/managed-by";

/// Value of [`LABEL_MANAGED_BY`]
pub const LABEL_MANAGED_BY_VALUE: &str = "gateway-auto-listener";

/// Default namespace annotation holding extra hostnames a namespace may claim
pub const DEFAULT_ALLOWED_HOSTNAMES_ANNOTATION: &str = "gateway-auto-listener/allowed-hostnames";

/// Lease used for leader election between operator replicas
pub const LEADER_LEASE_NAME: &str = "gateway-auto-listener.an0nfunc.github.io";
