//! Route lifecycle: management detection, finalizer handling and the step a
//! pass should take for a route snapshot.

use std::collections::BTreeMap;

use kube::{Resource, ResourceExt};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use autolistener_common::network::HttpRoute;
use autolistener_common::{
    Error, CLUSTER_ISSUER_ANNOTATION, ISSUER_ANNOTATION, LEGACY_ROUTE_FINALIZER,
    MANAGED_LISTENERS_ANNOTATION, ROUTE_FINALIZER,
};

use crate::client::KubeClient;

/// What a reconciliation pass should do with a route
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Not managed and not holding the finalizer
    Ignore,
    /// Holds the finalizer but is being deleted or is no longer managed:
    /// remove recorded listeners, then release the finalizer
    Cleanup,
    /// Managed but the finalizer is missing; add it before any listener work
    AddFinalizer,
    /// Managed and finalized; sync listeners with hostnames
    Sync,
}

/// A route is managed iff it names a cert-manager issuer
pub fn is_managed(route: &HttpRoute) -> bool {
    let annotations = route.annotations();
    annotations.contains_key(CLUSTER_ISSUER_ANNOTATION) || annotations.contains_key(ISSUER_ANNOTATION)
}

fn is_ours(finalizer: &str) -> bool {
    finalizer == ROUTE_FINALIZER || finalizer == LEGACY_ROUTE_FINALIZER
}

/// True if the route holds our finalizer.
///
/// The legacy token only survives migration on routes already being deleted,
/// where it still guards cleanup.
pub fn has_finalizer(route: &HttpRoute) -> bool {
    route.finalizers().iter().any(|f| is_ours(f))
}

/// True once the route has a deletion timestamp
pub fn is_deleting(route: &HttpRoute) -> bool {
    route.meta().deletion_timestamp.is_some()
}

/// Replace the legacy finalizer with the current one.
///
/// Returns `None` when the legacy token is absent. Other finalizers keep
/// their positions; the current token is not duplicated.
pub fn migrated_finalizers(finalizers: &[String]) -> Option<Vec<String>> {
    if !finalizers.iter().any(|f| f == LEGACY_ROUTE_FINALIZER) {
        return None;
    }
    let has_current = finalizers.iter().any(|f| f == ROUTE_FINALIZER);
    let mut migrated = Vec::with_capacity(finalizers.len());
    for f in finalizers {
        if f == LEGACY_ROUTE_FINALIZER {
            if !has_current && !migrated.iter().any(|m: &String| m == ROUTE_FINALIZER) {
                migrated.push(ROUTE_FINALIZER.to_string());
            }
        } else {
            migrated.push(f.clone());
        }
    }
    Some(migrated)
}

/// Decide the next step for a route snapshot
pub fn next_step(route: &HttpRoute) -> LifecycleStep {
    let finalized = has_finalizer(route);
    if is_deleting(route) || !is_managed(route) {
        return if finalized {
            LifecycleStep::Cleanup
        } else {
            LifecycleStep::Ignore
        };
    }
    if finalized {
        LifecycleStep::Sync
    } else {
        LifecycleStep::AddFinalizer
    }
}

/// Merge patch over a route's metadata.
///
/// Carries the resourceVersion it was computed from so a concurrent writer
/// turns the update into a conflict instead of a lost write. Annotation
/// values of `None` delete the key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMetadataPatch {
    /// resourceVersion precondition
    pub resource_version: Option<String>,
    /// Replacement finalizer list
    pub finalizers: Option<Vec<String>>,
    /// Annotations to set or delete
    pub annotations: BTreeMap<String, Option<String>>,
}

impl RouteMetadataPatch {
    /// Empty patch guarded by the route's current resourceVersion
    pub fn for_route(route: &HttpRoute) -> Self {
        Self {
            resource_version: route.resource_version(),
            ..Default::default()
        }
    }

    /// Replace the finalizer list
    pub fn with_finalizers(mut self, finalizers: Vec<String>) -> Self {
        self.finalizers = Some(finalizers);
        self
    }

    /// Set (`Some`) or delete (`None`) an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.annotations.insert(key.into(), value);
        self
    }

    /// Render as a JSON merge patch
    pub fn to_merge_patch(&self) -> Value {
        let mut metadata = Map::new();
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".to_string(), json!(rv));
        }
        if let Some(finalizers) = &self.finalizers {
            metadata.insert("finalizers".to_string(), json!(finalizers));
        }
        if !self.annotations.is_empty() {
            metadata.insert("annotations".to_string(), json!(self.annotations));
        }
        json!({ "metadata": metadata })
    }
}

fn route_namespace(route: &HttpRoute) -> Result<String, Error> {
    route
        .namespace()
        .ok_or_else(|| Error::internal_with_context("lifecycle", "HTTPRoute has no namespace"))
}

/// Swap the legacy finalizer for the current one, if present.
///
/// Runs for every route, managed or not, as its own update. Deleting routes
/// are left alone: the API server rejects new finalizers once a deletion
/// timestamp is set, and cleanup releases the legacy token instead.
pub async fn migrate_legacy_finalizer(
    kube: &dyn KubeClient,
    route: HttpRoute,
) -> Result<HttpRoute, Error> {
    let Some(finalizers) = migrated_finalizers(route.finalizers()) else {
        return Ok(route);
    };
    if is_deleting(&route) {
        debug!(route = %route.name_any(), "Route deleting, legacy finalizer released by cleanup");
        return Ok(route);
    }
    let namespace = route_namespace(&route)?;
    let name = route.name_any();
    info!(route = %name, namespace = %namespace, "Migrating legacy finalizer");
    let patch = RouteMetadataPatch::for_route(&route).with_finalizers(finalizers);
    kube.patch_route_metadata(&namespace, &name, &patch).await
}

/// Append the current finalizer
pub async fn add_finalizer(kube: &dyn KubeClient, route: &HttpRoute) -> Result<HttpRoute, Error> {
    let namespace = route_namespace(route)?;
    let name = route.name_any();
    let mut finalizers = route.finalizers().to_vec();
    finalizers.push(ROUTE_FINALIZER.to_string());
    debug!(route = %name, namespace = %namespace, "Adding finalizer");
    let patch = RouteMetadataPatch::for_route(route).with_finalizers(finalizers);
    kube.patch_route_metadata(&namespace, &name, &patch).await
}

/// Patch that drops our finalizer (current and legacy tokens).
///
/// A route that stays around (no longer managed) also loses its recorded
/// listener annotation.
pub fn release_patch(route: &HttpRoute) -> RouteMetadataPatch {
    let finalizers = route
        .finalizers()
        .iter()
        .filter(|f| !is_ours(f))
        .cloned()
        .collect();
    let patch = RouteMetadataPatch::for_route(route).with_finalizers(finalizers);
    if !is_deleting(route) && route.annotations().contains_key(MANAGED_LISTENERS_ANNOTATION) {
        patch.with_annotation(MANAGED_LISTENERS_ANNOTATION, None)
    } else {
        patch
    }
}

/// Drop our finalizer so deletion can complete
pub async fn release_finalizer(kube: &dyn KubeClient, route: &HttpRoute) -> Result<HttpRoute, Error> {
    let namespace = route_namespace(route)?;
    let name = route.name_any();
    debug!(route = %name, namespace = %namespace, "Removing finalizer");
    kube.patch_route_metadata(&namespace, &name, &release_patch(route))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use autolistener_common::network::HttpRouteSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    fn route(annotations: &[(&str, &str)], finalizers: &[&str], deleting: bool) -> HttpRoute {
        HttpRoute {
            metadata: ObjectMeta {
                name: Some("app".to_string()),
                namespace: Some("tenant-1".to_string()),
                resource_version: Some("7".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
                deletion_timestamp: deleting.then(|| Time(chrono::Utc::now())),
                ..Default::default()
            },
            spec: HttpRouteSpec {
                hostnames: vec!["app.example.com".to_string()],
            },
        }
    }

    // =========================================================================
    // Management and step selection
    // =========================================================================

    #[test]
    fn either_issuer_annotation_makes_a_route_managed() {
        assert!(is_managed(&route(&[(CLUSTER_ISSUER_ANNOTATION, "le")], &[], false)));
        assert!(is_managed(&route(&[(ISSUER_ANNOTATION, "local")], &[], false)));
        assert!(!is_managed(&route(&[("other", "x")], &[], false)));
    }

    #[test]
    fn step_follows_route_state() {
        let issuer = [(CLUSTER_ISSUER_ANNOTATION, "le")];

        assert_eq!(next_step(&route(&[], &[], false)), LifecycleStep::Ignore);
        assert_eq!(next_step(&route(&issuer, &[], false)), LifecycleStep::AddFinalizer);
        assert_eq!(
            next_step(&route(&issuer, &[ROUTE_FINALIZER], false)),
            LifecycleStep::Sync
        );
        assert_eq!(
            next_step(&route(&issuer, &[ROUTE_FINALIZER], true)),
            LifecycleStep::Cleanup
        );
        // Deleting without our finalizer: nothing left for us to do
        assert_eq!(next_step(&route(&issuer, &["other"], true)), LifecycleStep::Ignore);
        // Issuer annotations removed while still finalized
        assert_eq!(
            next_step(&route(&[], &[ROUTE_FINALIZER], false)),
            LifecycleStep::Cleanup
        );
    }

    // =========================================================================
    // Finalizer migration
    // =========================================================================

    #[test]
    fn legacy_finalizer_is_replaced_in_place() {
        let finalizers = vec![
            "a".to_string(),
            LEGACY_ROUTE_FINALIZER.to_string(),
            "b".to_string(),
        ];
        assert_eq!(
            migrated_finalizers(&finalizers),
            Some(vec!["a".to_string(), ROUTE_FINALIZER.to_string(), "b".to_string()])
        );
    }

    #[test]
    fn migration_does_not_duplicate_current_finalizer() {
        let finalizers = vec![
            ROUTE_FINALIZER.to_string(),
            LEGACY_ROUTE_FINALIZER.to_string(),
        ];
        assert_eq!(
            migrated_finalizers(&finalizers),
            Some(vec![ROUTE_FINALIZER.to_string()])
        );
    }

    #[test]
    fn no_migration_without_legacy_finalizer() {
        assert_eq!(migrated_finalizers(&[ROUTE_FINALIZER.to_string()]), None);
        assert_eq!(migrated_finalizers(&[]), None);
    }

    #[tokio::test]
    async fn migration_patches_even_unmanaged_routes() {
        let legacy = route(&[], &[LEGACY_ROUTE_FINALIZER], false);
        let mut mock = MockKubeClient::new();
        mock.expect_patch_route_metadata()
            .withf(|ns, name, patch| {
                ns == "tenant-1"
                    && name == "app"
                    && patch.resource_version.as_deref() == Some("7")
                    && patch.finalizers == Some(vec![ROUTE_FINALIZER.to_string()])
            })
            .times(1)
            .returning(|_, _, _| Ok(route(&[], &[ROUTE_FINALIZER], false)));

        let migrated = migrate_legacy_finalizer(&mock, legacy).await.unwrap();
        assert!(has_finalizer(&migrated));
    }

    #[tokio::test]
    async fn migration_is_skipped_without_legacy_finalizer() {
        let mock = MockKubeClient::new();
        let current = route(&[], &[ROUTE_FINALIZER], false);
        let result = migrate_legacy_finalizer(&mock, current.clone()).await.unwrap();
        assert_eq!(result, current);
    }

    #[tokio::test]
    async fn deleting_route_keeps_legacy_finalizer_for_cleanup() {
        let mock = MockKubeClient::new();
        let deleting = route(
            &[(CLUSTER_ISSUER_ANNOTATION, "le")],
            &["other", LEGACY_ROUTE_FINALIZER],
            true,
        );

        let result = migrate_legacy_finalizer(&mock, deleting.clone()).await.unwrap();
        assert_eq!(result, deleting, "no finalizer may be added while deleting");
        assert_eq!(next_step(&result), LifecycleStep::Cleanup);
        assert_eq!(release_patch(&result).finalizers, Some(vec!["other".to_string()]));
    }

    // =========================================================================
    // Release
    // =========================================================================

    #[test]
    fn release_keeps_foreign_finalizers() {
        let r = route(
            &[(CLUSTER_ISSUER_ANNOTATION, "le")],
            &["other", ROUTE_FINALIZER],
            true,
        );
        let patch = release_patch(&r);
        assert_eq!(patch.finalizers, Some(vec!["other".to_string()]));
        assert!(patch.annotations.is_empty());
    }

    #[test]
    fn release_of_live_route_clears_recorded_annotation() {
        let r = route(
            &[(MANAGED_LISTENERS_ANNOTATION, "https-app-example-com")],
            &[ROUTE_FINALIZER],
            false,
        );
        let patch = release_patch(&r);
        assert_eq!(
            patch.annotations.get(MANAGED_LISTENERS_ANNOTATION),
            Some(&None)
        );
    }

    #[test]
    fn metadata_patch_renders_null_for_deleted_annotations() {
        let patch = RouteMetadataPatch {
            resource_version: Some("9".to_string()),
            finalizers: Some(vec![]),
            annotations: BTreeMap::from([(MANAGED_LISTENERS_ANNOTATION.to_string(), None)]),
        };
        assert_eq!(
            patch.to_merge_patch(),
            json!({
                "metadata": {
                    "resourceVersion": "9",
                    "finalizers": [],
                    "annotations": { MANAGED_LISTENERS_ANNOTATION: null }
                }
            })
        );
    }
}
