//! Gateway patching with optimistic concurrency
//!
//! The whole `spec.listeners` array is written back with a merge patch that
//! carries the resourceVersion of the snapshot the diff was computed from.
//! If anyone else wrote the Gateway in between, the API server rejects the
//! patch and the pass fails; there is no local merge.

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use autolistener_common::network::{Gateway, GatewayListener, HttpRoute};
use autolistener_common::{
    metrics, Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE, MANAGED_LISTENERS_ANNOTATION,
};

use crate::client::KubeClient;
use crate::config::GatewayRef;
use crate::diff::ListenerDiff;
use crate::lifecycle::RouteMetadataPatch;
use crate::listener::ManagedListeners;

/// Result of applying a diff to the Gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The Gateway was patched
    Applied {
        /// Listeners appended
        added: usize,
        /// Listeners removed
        removed: usize,
    },
    /// The listener collection would not change; nothing was written
    NoOp,
    /// The Gateway changed since it was read
    Conflict,
}

/// Merge patch over a Gateway
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayPatch {
    /// resourceVersion precondition
    pub resource_version: Option<String>,
    /// Labels to add
    pub labels: BTreeMap<String, String>,
    /// Complete replacement listener list
    pub listeners: Vec<GatewayListener>,
}

impl GatewayPatch {
    /// Render as a JSON merge patch
    pub fn to_merge_patch(&self) -> Result<Value, Error> {
        let listeners = serde_json::to_value(&self.listeners)
            .map_err(|e| Error::serialization(format!("gateway listeners: {e}")))?;

        let mut metadata = Map::new();
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".to_string(), json!(rv));
        }
        if !self.labels.is_empty() {
            metadata.insert("labels".to_string(), json!(self.labels));
        }

        Ok(json!({
            "metadata": metadata,
            "spec": { "listeners": listeners },
        }))
    }
}

/// Compute the patch for `diff` against `base`.
///
/// New collection is the current listeners minus removals, in their original
/// order, followed by additions. Returns `None` when that equals the base.
pub fn plan(base: &Gateway, diff: &ListenerDiff) -> Option<GatewayPatch> {
    if diff.is_empty() {
        return None;
    }
    let mut listeners: Vec<GatewayListener> = base
        .spec
        .listeners
        .iter()
        .filter(|l| !diff.to_remove.contains(&l.name))
        .cloned()
        .collect();
    listeners.extend(diff.to_add.iter().cloned());

    if listeners == base.spec.listeners {
        return None;
    }

    let mut labels = BTreeMap::new();
    if base.labels().get(LABEL_MANAGED_BY).map(String::as_str) != Some(LABEL_MANAGED_BY_VALUE) {
        labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_VALUE.to_string());
    }

    Some(GatewayPatch {
        resource_version: base.resource_version(),
        labels,
        listeners,
    })
}

/// Apply `diff` to the Gateway snapshot `base`
pub async fn apply(
    kube: &dyn KubeClient,
    gateway: &GatewayRef,
    base: &Gateway,
    diff: &ListenerDiff,
) -> Result<PatchOutcome, Error> {
    let Some(patch) = plan(base, diff) else {
        debug!(gateway = %gateway, "Gateway listeners already up to date");
        metrics::record_gateway_patch("noop");
        return Ok(PatchOutcome::NoOp);
    };

    let before = base.spec.listeners.len();
    let added = diff.to_add.len();
    let removed = before + added - patch.listeners.len();

    match kube.patch_gateway(gateway, &patch).await {
        Ok(_) => {
            info!(gateway = %gateway, added, removed, "Patched gateway listeners");
            metrics::record_gateway_patch("applied");
            metrics::record_listener_changes(added, removed);
            Ok(PatchOutcome::Applied { added, removed })
        }
        Err(e) if e.is_conflict() => {
            debug!(gateway = %gateway, "Gateway modified concurrently");
            metrics::record_gateway_patch("conflict");
            Ok(PatchOutcome::Conflict)
        }
        Err(e) => Err(e),
    }
}

/// Persist the recorded listener set on the route; skipped when unchanged
///
/// An empty set deletes the annotation.
pub async fn persist_recorded(
    kube: &dyn KubeClient,
    route: &HttpRoute,
    recorded: &ManagedListeners,
) -> Result<Option<HttpRoute>, Error> {
    if ManagedListeners::from_route(route) == *recorded {
        return Ok(None);
    }
    let namespace = route
        .namespace()
        .ok_or_else(|| Error::internal_with_context("patcher", "HTTPRoute has no namespace"))?;
    let name = route.name_any();
    let value = (!recorded.is_empty()).then(|| recorded.to_annotation());
    debug!(route = %name, namespace = %namespace, listeners = ?value, "Recording managed listeners");

    let patch =
        RouteMetadataPatch::for_route(route).with_annotation(MANAGED_LISTENERS_ANNOTATION, value);
    kube.patch_route_metadata(&namespace, &name, &patch)
        .await
        .map(Some)
}
