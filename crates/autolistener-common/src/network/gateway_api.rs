//! Gateway API resources read and written by the listener controller
//!
//! Only the fields the controller needs are modeled. Listener sub-objects keep
//! every field they do not model in a flattened `extra` map, because the
//! controller writes the whole `spec.listeners` array back with a merge patch:
//! listeners created by hand must survive that round trip byte-for-byte.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TLS mode that terminates TLS at the Gateway
pub const TLS_MODE_TERMINATE: &str = "Terminate";

/// HTTPS listener protocol
pub const PROTOCOL_HTTPS: &str = "HTTPS";

/// Route namespace selection admitting routes from every namespace
pub const FROM_ALL_NAMESPACES: &str = "All";

/// Gateway spec (`gateway.networking.k8s.io/v1`, kind Gateway)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass name
    #[serde(default)]
    pub gateway_class_name: String,
    /// Listener configurations, in declaration order
    #[serde(default)]
    pub listeners: Vec<GatewayListener>,
}

/// Gateway listener configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayListener {
    /// Listener name, unique within the Gateway
    pub name: String,
    /// Optional hostname filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Port number
    pub port: u16,
    /// Protocol (HTTP, HTTPS, TLS, TCP, ...)
    pub protocol: String,
    /// TLS configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsConfig>,
    /// Allowed routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
    /// Fields not modeled above, preserved verbatim
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Gateway TLS configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsConfig {
    /// TLS mode (Terminate, Passthrough)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Certificate references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate_refs: Vec<SecretObjectReference>,
    /// Fields not modeled above (options, frontendValidation, ...)
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Reference to a TLS certificate Secret
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectReference {
    /// API group (empty for core)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resource kind (default: Secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Secret name
    pub name: String,
    /// Secret namespace (defaults to the Gateway's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Allowed routes for a gateway listener
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowedRoutes {
    /// Namespace selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<RouteNamespaces>,
    /// Fields not modeled above (kinds)
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AllowedRoutes {
    /// Routes allowed from every namespace
    pub fn all_namespaces() -> Self {
        Self {
            namespaces: Some(RouteNamespaces {
                from: Some(FROM_ALL_NAMESPACES.to_string()),
                extra: BTreeMap::new(),
            }),
            extra: BTreeMap::new(),
        }
    }
}

/// Route namespace selector
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteNamespaces {
    /// Namespace selection mode (Same, All, Selector)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Fields not modeled above (selector)
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// HTTPRoute spec (`gateway.networking.k8s.io/v1`, kind HTTPRoute)
///
/// The controller reads hostnames only; it never writes `spec`.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Hostnames the route answers for, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
}

/// HTTPRoute resource
pub type HttpRoute = HTTPRoute;
