//! Listener derivation and the per-route recorded listener set
//!
//! A listener is a pure function of a hostname. The names are the contract
//! between the controller, cert-manager (which provisions the `-tls` Secret
//! named here) and the recorded-set annotation on each route, so they must
//! never change shape.

use std::collections::BTreeSet;

use autolistener_common::network::{
    AllowedRoutes, GatewayListener, GatewayTlsConfig, HttpRoute, SecretObjectReference,
};
use autolistener_common::network::gateway_api::{PROTOCOL_HTTPS, TLS_MODE_TERMINATE};
use autolistener_common::MANAGED_LISTENERS_ANNOTATION;
use kube::ResourceExt;

/// Port every derived listener binds
pub const LISTENER_PORT: u16 = 443;

const LISTENER_PREFIX: &str = "https-";
const SECRET_SUFFIX: &str = "-tls";
const WILDCARD_TOKEN: &str = "wildcard";

fn sanitize(hostname: &str) -> String {
    hostname.replace('.', "-").replace('*', WILDCARD_TOKEN)
}

/// Listener name for a hostname: `*.example.com` becomes `https-wildcard-example-com`
pub fn listener_name(hostname: &str) -> String {
    format!("{LISTENER_PREFIX}{}", sanitize(hostname))
}

/// TLS Secret name for a hostname: `*.example.com` becomes `wildcard-example-com-tls`
pub fn secret_name(hostname: &str) -> String {
    format!("{}{SECRET_SUFFIX}", sanitize(hostname))
}

/// Build the HTTPS listener for a hostname.
///
/// TLS terminates at the Gateway with a certificate Secret that lives in
/// `secret_namespace` (the Gateway's own namespace). Routes from every
/// namespace may attach.
pub fn build_listener(hostname: &str, secret_namespace: &str) -> GatewayListener {
    GatewayListener {
        name: listener_name(hostname),
        hostname: Some(hostname.to_string()),
        port: LISTENER_PORT,
        protocol: PROTOCOL_HTTPS.to_string(),
        tls: Some(GatewayTlsConfig {
            mode: Some(TLS_MODE_TERMINATE.to_string()),
            certificate_refs: vec![SecretObjectReference {
                name: secret_name(hostname),
                namespace: Some(secret_namespace.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        allowed_routes: Some(AllowedRoutes::all_namespaces()),
        ..Default::default()
    }
}

/// Listener names the controller created on behalf of one route.
///
/// Stored on the route as a comma-joined, sorted list under
/// [`MANAGED_LISTENERS_ANNOTATION`]. This is the only memory the controller
/// has of what it added; anything not in here is never removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagedListeners(BTreeSet<String>);

impl ManagedListeners {
    /// Parse an annotation value. Blank entries are ignored.
    pub fn from_annotation(value: &str) -> Self {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Read the recorded set from a route (empty when the annotation is absent)
    pub fn from_route(route: &HttpRoute) -> Self {
        route
            .annotations()
            .get(MANAGED_LISTENERS_ANNOTATION)
            .map(|v| Self::from_annotation(v))
            .unwrap_or_default()
    }

    /// Encode for the annotation value
    pub fn to_annotation(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Whether a listener name is recorded
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Record a listener name
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    /// Iterate names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for ManagedListeners {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolistener_common::network::HttpRouteSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn listener_names_are_derived_from_hostnames() {
        let cases = [
            ("example.com", "https-example-com"),
            ("sub.example.com", "https-sub-example-com"),
            ("*.example.com", "https-wildcard-example-com"),
            ("a.b.c.d.example.com", "https-a-b-c-d-example-com"),
            ("example", "https-example"),
            ("", "https-"),
        ];
        for (hostname, expected) in cases {
            assert_eq!(listener_name(hostname), expected, "hostname {hostname:?}");
        }
    }

    #[test]
    fn secret_names_are_derived_from_hostnames() {
        let cases = [
            ("example.com", "example-com-tls"),
            ("sub.example.com", "sub-example-com-tls"),
            ("*.example.com", "wildcard-example-com-tls"),
            ("a.b.c.d.example.com", "a-b-c-d-example-com-tls"),
            ("example", "example-tls"),
            ("", "-tls"),
        ];
        for (hostname, expected) in cases {
            assert_eq!(secret_name(hostname), expected, "hostname {hostname:?}");
        }
    }

    #[test]
    fn built_listener_terminates_tls_on_443() {
        let listener = build_listener("*.example.com", "nginx-gateway");

        assert_eq!(listener.name, "https-wildcard-example-com");
        assert_eq!(listener.hostname.as_deref(), Some("*.example.com"));
        assert_eq!(listener.port, 443);
        assert_eq!(listener.protocol, "HTTPS");

        let tls = listener.tls.expect("tls config");
        assert_eq!(tls.mode.as_deref(), Some("Terminate"));
        assert_eq!(tls.certificate_refs.len(), 1);
        assert_eq!(tls.certificate_refs[0].name, "wildcard-example-com-tls");
        assert_eq!(
            tls.certificate_refs[0].namespace.as_deref(),
            Some("nginx-gateway")
        );

        let from = listener
            .allowed_routes
            .and_then(|a| a.namespaces)
            .and_then(|n| n.from);
        assert_eq!(from.as_deref(), Some("All"));
    }

    #[test]
    fn managed_listeners_parse_and_encode_sorted() {
        let set = ManagedListeners::from_annotation(" https-b-com, https-a-com,,https-b-com ");
        assert_eq!(set.iter().count(), 2);
        assert_eq!(set.to_annotation(), "https-a-com,https-b-com");
        assert!(ManagedListeners::from_annotation("").is_empty());
    }

    #[test]
    fn managed_listeners_read_from_route_annotation() {
        let mut route = HttpRoute {
            metadata: ObjectMeta {
                name: Some("app".to_string()),
                namespace: Some("tenant-1".to_string()),
                ..Default::default()
            },
            spec: HttpRouteSpec::default(),
        };
        assert!(ManagedListeners::from_route(&route).is_empty());

        route.annotations_mut().insert(
            MANAGED_LISTENERS_ANNOTATION.to_string(),
            "https-app-example-com".to_string(),
        );
        let set = ManagedListeners::from_route(&route);
        assert!(set.contains("https-app-example-com"));
    }
}
