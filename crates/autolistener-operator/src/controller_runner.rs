//! Controller runner - builds the HTTPRoute controller future
//!
//! Routes are watched cluster-wide. The configured Gateway is watched too;
//! any change to it (including someone deleting a listener by hand)
//! re-enqueues every managed route so the listeners are restored.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};

use autolistener_common::network::{Gateway, HttpRoute};
use autolistener_route::{error_policy, reconcile, routes_for_gateway, Context, ControllerConfig};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Field selector matching only the configured Gateway
fn gateway_field_selector(config: &ControllerConfig) -> String {
    format!("metadata.name={}", config.gateway.name)
}

/// Build the HTTPRoute controller future
pub fn build_route_controller(
    client: Client,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let routes: Api<HttpRoute> = Api::all(client.clone());
    let gateways: Api<Gateway> = Api::namespaced(client.clone(), &config.gateway.namespace);
    let ctx = Arc::new(Context::new(client, config.clone()));

    let controller = Controller::new(routes, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS));
    let store = controller.store();
    let selector = gateway_field_selector(&config);

    tracing::info!(gateway = %config.gateway, "- HTTPRoute controller");

    Box::pin(
        controller
            .watches(
                gateways,
                WatcherConfig::default()
                    .fields(&selector)
                    .timeout(WATCH_TIMEOUT_SECS),
                move |gateway| {
                    let routes = store.state();
                    let refs =
                        routes_for_gateway(&gateway, &config, routes.iter().map(Arc::as_ref));
                    tracing::debug!(
                        gateway = %gateway.name_any(),
                        routes = refs.len(),
                        "Gateway changed, requeueing managed routes"
                    );
                    refs
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("HTTPRoute")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
