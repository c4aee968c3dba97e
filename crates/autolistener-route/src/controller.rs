//! HTTPRoute controller implementation
//!
//! One reconciliation pass reads a fresh route, walks it through the
//! lifecycle (finalizer migration, admission, cleanup) and, for managed
//! routes, syncs the Gateway's listeners with the route's allowed hostnames.
//! Passes hold no state between runs: everything the controller remembers
//! lives on the route (finalizer and recorded listener set) and on the
//! Gateway itself.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use autolistener_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use autolistener_common::network::{Gateway, HttpRoute};
use autolistener_common::{metrics, Error, CONTROLLER_NAME};

use crate::client::{KubeClient, KubeClientImpl};
use crate::config::ControllerConfig;
use crate::diff::{self, ListenerDiff};
use crate::lifecycle::{self, LifecycleStep};
use crate::listener::ManagedListeners;
use crate::patcher::{self, PatchOutcome};
use crate::policy::{HostnameValidator, PolicyDecision};

/// Requeue delay after an optimistic-concurrency conflict
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);
/// Requeue delay after a retryable failure
pub const RETRY_REQUEUE: Duration = Duration::from_secs(5);
/// Requeue delay after a failure that needs an outside change
pub const PERMANENT_FAILURE_REQUEUE: Duration = Duration::from_secs(300);

/// Controller context shared by every reconciliation pass
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event publisher for route Events
    pub events: Arc<dyn EventPublisher>,
    /// Target gateway and hostname policy
    pub config: ControllerConfig,
}

impl Context {
    /// Create a context backed by the real API server
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            kube: Arc::new(KubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config,
        }
    }

    /// Create a context for testing with custom clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            events,
            config,
        }
    }
}

/// What a completed pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The route no longer exists
    NotFound,
    /// Unmanaged route without our finalizer
    Ignored,
    /// Listeners synced; carries the gateway patch result (never `Conflict`)
    Synced(PatchOutcome),
    /// Recorded listeners removed and finalizer released
    CleanedUp {
        /// Listeners removed from the Gateway
        removed: usize,
    },
}

impl PassOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::NotFound => "not_found",
            PassOutcome::Ignored => "ignored",
            PassOutcome::Synced(_) => "synced",
            PassOutcome::CleanedUp { .. } => "cleaned_up",
        }
    }
}

/// Reconcile an HTTPRoute
///
/// The watched object only names the route; the pass re-reads it so every
/// decision is made against the latest snapshot.
#[instrument(
    skip(route, ctx),
    fields(route = %route.name_any(), namespace = %route.namespace().unwrap_or_default())
)]
pub async fn reconcile(route: Arc<HttpRoute>, ctx: Arc<Context>) -> Result<Action, Error> {
    let started = Instant::now();
    let namespace = route
        .namespace()
        .ok_or_else(|| Error::internal_with_context("reconciler", "HTTPRoute has no namespace"))?;
    let name = route.name_any();

    let result = reconcile_route(&ctx, &namespace, &name).await;
    let elapsed = started.elapsed().as_secs_f64();
    match &result {
        Ok(outcome) => {
            debug!(outcome = outcome.label(), "reconcile pass complete");
            metrics::record_reconcile(outcome.label(), elapsed);
        }
        Err(_) => metrics::record_reconcile("error", elapsed),
    }
    result.map(|_| Action::await_change())
}

/// Run one pass for the route `namespace/name`
pub async fn reconcile_route(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<PassOutcome, Error> {
    let kube = ctx.kube.as_ref();

    let Some(route) = kube.get_route(namespace, name).await? else {
        debug!("route not found, nothing to do");
        return Ok(PassOutcome::NotFound);
    };

    let route = lifecycle::migrate_legacy_finalizer(kube, route).await?;

    match lifecycle::next_step(&route) {
        LifecycleStep::Ignore => Ok(PassOutcome::Ignored),
        LifecycleStep::Cleanup => cleanup(ctx, &route).await,
        LifecycleStep::AddFinalizer => {
            info!("adding finalizer to managed route");
            let route = lifecycle::add_finalizer(kube, &route).await?;
            sync(ctx, &route, namespace).await
        }
        LifecycleStep::Sync => sync(ctx, &route, namespace).await,
    }
}

/// Bring the Gateway's listeners in line with the route's allowed hostnames
async fn sync(ctx: &Context, route: &HttpRoute, namespace: &str) -> Result<PassOutcome, Error> {
    let kube = ctx.kube.as_ref();
    let target = &ctx.config.gateway;

    let gateway = kube.get_gateway(target).await?.ok_or_else(|| {
        Error::internal_with_context("reconciler", format!("gateway {target} not found"))
    })?;

    let desired = allowed_hostnames(ctx, route, namespace).await?;
    let recorded = ManagedListeners::from_route(route);
    let diff = diff::compute(&desired, &recorded, &gateway.spec.listeners, &target.namespace);
    report_conflicts(ctx, route, &diff).await;

    let outcome = patcher::apply(kube, target, &gateway, &diff).await?;
    if outcome == PatchOutcome::Conflict {
        return Err(Error::conflict("Gateway", target.to_string()));
    }

    patcher::persist_recorded(kube, route, &diff.recorded).await?;

    if let PatchOutcome::Applied { added, removed } = outcome {
        publish(
            ctx,
            route,
            EventType::Normal,
            reasons::LISTENERS_UPDATED,
            actions::RECONCILE,
            format!("added {added} and removed {removed} listener(s) on gateway {target}"),
        )
        .await;
    }

    Ok(PassOutcome::Synced(outcome))
}

/// Remove every recorded listener, then release the finalizer
async fn cleanup(ctx: &Context, route: &HttpRoute) -> Result<PassOutcome, Error> {
    let kube = ctx.kube.as_ref();
    let target = &ctx.config.gateway;
    let recorded = ManagedListeners::from_route(route);

    let mut removed = 0;
    if !recorded.is_empty() {
        match kube.get_gateway(target).await? {
            None => {
                warn!(gateway = %target, "gateway not found, no listeners to remove");
            }
            Some(gateway) => {
                let diff = diff::compute_removal(&recorded);
                match patcher::apply(kube, target, &gateway, &diff).await? {
                    PatchOutcome::Applied { removed: n, .. } => removed = n,
                    PatchOutcome::NoOp => {}
                    PatchOutcome::Conflict => {
                        return Err(Error::conflict("Gateway", target.to_string()));
                    }
                }
            }
        }
    }

    lifecycle::release_finalizer(kube, route).await?;
    info!(removed, "released route");

    if removed > 0 {
        publish(
            ctx,
            route,
            EventType::Normal,
            reasons::LISTENERS_REMOVED,
            actions::DELETE,
            format!("removed {removed} listener(s) from gateway {target}"),
        )
        .await;
    }

    Ok(PassOutcome::CleanedUp { removed })
}

/// Deduplicated route hostnames that pass the namespace policy
///
/// Denied hostnames are reported and skipped; the rest of the route still
/// gets its listeners.
async fn allowed_hostnames(
    ctx: &Context,
    route: &HttpRoute,
    namespace: &str,
) -> Result<Vec<String>, Error> {
    let mut validator = HostnameValidator::new(&ctx.config.policy, ctx.kube.as_ref(), namespace);
    let mut allowed: Vec<String> = Vec::with_capacity(route.spec.hostnames.len());
    let mut seen = BTreeSet::new();

    for hostname in &route.spec.hostnames {
        if !seen.insert(hostname.as_str()) {
            continue;
        }
        match validator.validate(hostname).await? {
            PolicyDecision::Allowed(by) => {
                debug!(hostname = %hostname, allowed_by = ?by, "hostname allowed");
                allowed.push(hostname.clone());
            }
            PolicyDecision::Denied { reason } => {
                warn!(hostname = %hostname, %reason, "hostname rejected by policy");
                metrics::record_hostname_denial();
                publish(
                    ctx,
                    route,
                    EventType::Warning,
                    reasons::HOSTNAME_VALIDATION_FAILED,
                    actions::VALIDATE,
                    reason,
                )
                .await;
            }
        }
    }
    Ok(allowed)
}

async fn report_conflicts(ctx: &Context, route: &HttpRoute, diff: &ListenerDiff) {
    for conflict in &diff.conflicts {
        let existing = conflict.existing_hostname.as_deref().unwrap_or("<none>");
        warn!(
            hostname = %conflict.hostname,
            listener = %conflict.listener,
            existing_hostname = existing,
            "listener name already in use"
        );
        publish(
            ctx,
            route,
            EventType::Warning,
            reasons::LISTENER_NAME_CONFLICT,
            actions::RECONCILE,
            format!(
                "listener {} for hostname {} is already used for hostname {}",
                conflict.listener, conflict.hostname, existing
            ),
        )
        .await;
    }
}

async fn publish(
    ctx: &Context,
    route: &HttpRoute,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    let reference: ObjectReference = route.object_ref(&());
    ctx.events
        .publish(&reference, type_, reason, action, Some(note))
        .await;
}

/// Error policy for the controller
///
/// Conflicts requeue almost immediately against a fresh snapshot. Failures
/// that need an outside change back off for five minutes.
pub fn error_policy(route: Arc<HttpRoute>, error: &Error, _ctx: Arc<Context>) -> Action {
    let route_name = route.name_any();
    if error.is_conflict() {
        debug!(route = %route_name, %error, "conflict, requeueing");
        return Action::requeue(CONFLICT_REQUEUE);
    }
    if error.is_retryable() {
        warn!(route = %route_name, %error, "reconciliation failed, will retry");
        return Action::requeue(RETRY_REQUEUE);
    }
    error!(?error, route = %route_name, "reconciliation failed");
    Action::requeue(PERMANENT_FAILURE_REQUEUE)
}

/// Routes to re-reconcile when the target Gateway changes
///
/// Only managed routes holding the finalizer are enqueued. Changes to any
/// other Gateway enqueue nothing.
pub fn routes_for_gateway<'a>(
    gateway: &Gateway,
    config: &ControllerConfig,
    routes: impl IntoIterator<Item = &'a HttpRoute>,
) -> Vec<ObjectRef<HttpRoute>> {
    if !config.gateway.matches(gateway) {
        return Vec::new();
    }
    routes
        .into_iter()
        .filter(|r| lifecycle::is_managed(r) && lifecycle::has_finalizer(r))
        .map(ObjectRef::from_obj)
        .collect()
}
