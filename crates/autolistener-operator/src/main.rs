//! gateway-auto-listener operator
//!
//! Keeps one HTTPS listener per hostname on a shared Gateway for every
//! HTTPRoute that names a cert-manager issuer.

mod config;
mod controller_runner;
mod health;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use autolistener_common::kube_utils::create_client;
use autolistener_common::leader_election::LeaderElector;
use autolistener_common::telemetry::{init_telemetry, TelemetryConfig};
use autolistener_common::{CONTROLLER_NAME, LEADER_LEASE_NAME};

use config::Cli;
use health::HealthState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig::for_gateway(
        &cli.gateway_namespace,
        &cli.gateway_name,
    ))?;

    let config = cli.controller_config()?;
    info!(
        gateway = %config.gateway,
        validated_ns_prefix = %config.policy.validated_namespace_prefix,
        allowed_domain_suffix = %config.policy.allowed_domain_suffix,
        "gateway-auto-listener starting..."
    );

    let client = create_client(cli.kubeconfig.as_deref()).await?;

    let health = HealthState::default();
    let probes = tokio::spawn({
        let health = health.clone();
        let addr = cli.health_probe_bind_address;
        async move {
            if let Err(e) = health::serve(addr, health).await {
                error!(error = %e, "Health probe server stopped");
            }
        }
    });
    health.set_ready(true);

    let guard = if cli.leader_election_enabled() {
        let identity = leader_identity();
        let elector = Arc::new(LeaderElector::new(
            client.clone(),
            LEADER_LEASE_NAME,
            cli.lease_namespace(),
            &identity,
        ));
        tokio::select! {
            guard = elector.acquire() => Some(guard),
            _ = shutdown_signal() => {
                info!("Shutdown requested while waiting for leadership");
                probes.abort();
                return Ok(());
            }
        }
    } else {
        warn!("Leader election disabled; run a single replica");
        None
    };

    let controller = controller_runner::build_route_controller(client, config);

    match guard {
        Some(mut guard) => {
            let leadership_lost = tokio::select! {
                _ = controller => false,
                _ = guard.lost() => true,
            };
            if leadership_lost {
                probes.abort();
                anyhow::bail!("leadership lost, exiting so a standby can take over");
            }
            if let Err(e) = guard.release_leadership().await {
                warn!(error = %e, "Failed to release leader lease");
            }
        }
        None => controller.await,
    }

    probes.abort();
    info!("gateway-auto-listener shutting down");
    Ok(())
}

/// Leader identity: the pod name when running in-cluster, otherwise host and pid
fn leader_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .map(|name| format!("{name}_{}", std::process::id()))
        .unwrap_or_else(|_| format!("{CONTROLLER_NAME}_{}", std::process::id()))
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
