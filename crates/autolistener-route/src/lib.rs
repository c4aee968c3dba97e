//! HTTPRoute reconciliation engine for gateway-auto-listener
//!
//! Watches HTTPRoutes that name a cert-manager issuer and keeps one HTTPS
//! listener per hostname on a single shared Gateway. cert-manager's
//! gateway-shim then provisions the certificate Secret each listener
//! references.
//!
//! - [`lifecycle`]: managed detection, finalizer migration and admission
//! - [`policy`]: namespace hostname policy
//! - [`listener`]: listener and Secret naming, recorded listener set
//! - [`diff`]: listeners to add and remove for a route
//! - [`patcher`]: compare-and-swap Gateway patch and recorded-set update
//! - [`controller`]: reconcile entry point, error policy, Gateway mapping

pub mod client;
pub mod config;
pub mod controller;
pub mod diff;
pub mod lifecycle;
pub mod listener;
pub mod patcher;
pub mod policy;

pub use client::{KubeClient, KubeClientImpl};
pub use config::{ControllerConfig, GatewayRef};
pub use controller::{error_policy, reconcile, routes_for_gateway, Context, PassOutcome};
pub use policy::HostnamePolicy;
