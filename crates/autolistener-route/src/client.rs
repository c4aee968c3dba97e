//! Kubernetes client seam for the route engine
//!
//! Every read and write the engine makes goes through [`KubeClient`], so a
//! whole reconciliation pass can run against a mock or an in-memory store.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;

use autolistener_common::kube_utils::{is_conflict, namespaced_name};
use autolistener_common::network::{Gateway, HttpRoute};
use autolistener_common::{Error, CONTROLLER_NAME};

use crate::config::GatewayRef;
use crate::lifecycle::RouteMetadataPatch;
use crate::patcher::GatewayPatch;

/// Trait abstracting the Kubernetes operations the engine performs
///
/// Patches carry the resourceVersion they were computed from. An
/// implementation must surface a 409 from the API server as
/// [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a route, `None` if it no longer exists
    async fn get_route(&self, namespace: &str, name: &str) -> Result<Option<HttpRoute>, Error>;

    /// Merge-patch a route's finalizers and/or annotations
    async fn patch_route_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &RouteMetadataPatch,
    ) -> Result<HttpRoute, Error>;

    /// Fetch the target Gateway, `None` if it does not exist
    async fn get_gateway(&self, gateway: &GatewayRef) -> Result<Option<Gateway>, Error>;

    /// Merge-patch the target Gateway's listeners and labels
    async fn patch_gateway(
        &self,
        gateway: &GatewayRef,
        patch: &GatewayPatch,
    ) -> Result<Gateway, Error>;

    /// Fetch a namespace, `None` if it does not exist
    ///
    /// Other failures are reported as [`Error::NamespaceLookup`].
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn patch_params() -> PatchParams {
        PatchParams::apply(CONTROLLER_NAME)
    }
}

fn map_write_error(kind: &str, name: String, e: kube::Error) -> Error {
    if is_conflict(&e) {
        Error::conflict(kind, name)
    } else {
        e.into()
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_route(&self, namespace: &str, name: &str) -> Result<Option<HttpRoute>, Error> {
        let api: Api<HttpRoute> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_route_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &RouteMetadataPatch,
    ) -> Result<HttpRoute, Error> {
        let api: Api<HttpRoute> = Api::namespaced(self.client.clone(), namespace);
        let body = patch.to_merge_patch();
        api.patch(name, &Self::patch_params(), &Patch::Merge(&body))
            .await
            .map_err(|e| map_write_error("HTTPRoute", namespaced_name(namespace, name), e))
    }

    async fn get_gateway(&self, gateway: &GatewayRef) -> Result<Option<Gateway>, Error> {
        let api: Api<Gateway> = Api::namespaced(self.client.clone(), &gateway.namespace);
        Ok(api.get_opt(&gateway.name).await?)
    }

    async fn patch_gateway(
        &self,
        gateway: &GatewayRef,
        patch: &GatewayPatch,
    ) -> Result<Gateway, Error> {
        let api: Api<Gateway> = Api::namespaced(self.client.clone(), &gateway.namespace);
        let body = patch.to_merge_patch()?;
        api.patch(&gateway.name, &Self::patch_params(), &Patch::Merge(&body))
            .await
            .map_err(|e| map_write_error("Gateway", gateway.to_string(), e))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| Error::namespace_lookup(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code,
        })
    }

    #[test]
    fn write_conflicts_become_conflict_errors() {
        let err = map_write_error("Gateway", "nginx-gateway/default".to_string(), api_error(409));
        assert!(matches!(err, Error::Conflict { ref kind, .. } if kind == "Gateway"));
    }

    #[test]
    fn other_write_failures_stay_kube_errors() {
        let err = map_write_error("HTTPRoute", "tenant-1/app".to_string(), api_error(403));
        assert!(matches!(err, Error::Kube { .. }));
        assert!(!err.is_retryable());
    }
}
