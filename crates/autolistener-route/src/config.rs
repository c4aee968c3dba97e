//! Typed configuration injected into the engine at startup

use std::fmt;

use autolistener_common::kube_utils::namespaced_name;
use autolistener_common::network::Gateway;
use autolistener_common::Error;
use kube::ResourceExt;

use crate::policy::HostnamePolicy;

/// Identity of the single Gateway whose listeners the controller manages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GatewayRef {
    /// Gateway name
    pub name: String,
    /// Gateway namespace; also where certificate Secrets live
    pub namespace: String,
}

impl GatewayRef {
    /// Create a gateway reference
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// True if `gateway` is the configured target
    pub fn matches(&self, gateway: &Gateway) -> bool {
        gateway.name_any() == self.name && gateway.namespace().as_deref() == Some(self.namespace.as_str())
    }
}

impl fmt::Display for GatewayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&namespaced_name(&self.namespace, &self.name))
    }
}

/// Controller configuration: target gateway plus hostname policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Gateway that receives the derived listeners
    pub gateway: GatewayRef,
    /// Namespace hostname policy
    pub policy: HostnamePolicy,
}

impl ControllerConfig {
    /// Build and validate a configuration
    pub fn new(gateway: GatewayRef, policy: HostnamePolicy) -> Result<Self, Error> {
        let config = Self { gateway, policy };
        config.validate()?;
        Ok(config)
    }

    /// Check the gateway identity is complete
    pub fn validate(&self) -> Result<(), Error> {
        if self.gateway.name.trim().is_empty() {
            return Err(Error::config("gateway name must not be empty"));
        }
        if self.gateway.namespace.trim().is_empty() {
            return Err(Error::config("gateway namespace must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn gateway(name: &str, namespace: &str) -> Gateway {
        Gateway {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        }
    }

    #[test]
    fn gateway_ref_matches_name_and_namespace() {
        let target = GatewayRef::new("default", "nginx-gateway");
        assert!(target.matches(&gateway("default", "nginx-gateway")));
        assert!(!target.matches(&gateway("default", "other")));
        assert!(!target.matches(&gateway("internal", "nginx-gateway")));
        assert_eq!(target.to_string(), "nginx-gateway/default");
    }

    #[test]
    fn empty_gateway_identity_is_rejected() {
        let err = ControllerConfig::new(GatewayRef::new("", "nginx-gateway"), HostnamePolicy::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ControllerConfig::new(GatewayRef::new("default", " "), HostnamePolicy::default())
            .unwrap_err();
        assert!(err.to_string().contains("namespace"));

        assert!(
            ControllerConfig::new(GatewayRef::new("default", "nginx-gateway"), HostnamePolicy::default())
                .is_ok()
        );
    }
}
