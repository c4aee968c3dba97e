//! Network resource types (Gateway API)

pub mod gateway_api;

pub use gateway_api::{
    AllowedRoutes, Gateway, GatewayListener, GatewaySpec, GatewayTlsConfig, HttpRoute,
    HttpRouteSpec, RouteNamespaces, SecretObjectReference,
};
