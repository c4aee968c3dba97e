//! Kubernetes Event recording for the listener controller.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that reconciliation can emit Events visible via `kubectl describe
//! httproute` without depending on a live API server in tests.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "HostnameValidationFailed")
    /// * `action` - What action was taken (e.g. "Reconcile")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column and are
/// stable: alerting rules match on them.
pub mod reasons {
    /// A route hostname was rejected by the namespace hostname policy
    pub const HOSTNAME_VALIDATION_FAILED: &str = "HostnameValidationFailed";
    /// A derived listener name is already used by a listener for another hostname
    pub const LISTENER_NAME_CONFLICT: &str = "ListenerNameConflict";
    /// Listeners were added to or removed from the Gateway for this route
    pub const LISTENERS_UPDATED: &str = "ListenersUpdated";
    /// All listeners recorded for this route were removed from the Gateway
    pub const LISTENERS_REMOVED: &str = "ListenersRemoved";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Hostname policy evaluation
    pub const VALIDATE: &str = "Validate";
    /// Cleanup on route deletion
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(
            reasons::HOSTNAME_VALIDATION_FAILED,
            "HostnameValidationFailed"
        );
        assert_eq!(reasons::LISTENER_NAME_CONFLICT, "ListenerNameConflict");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::HOSTNAME_VALIDATION_FAILED,
                actions::VALIDATE,
                Some("hostname evil.other.com not allowed for namespace tenant-1".to_string()),
            )
            .await;
    }
}
