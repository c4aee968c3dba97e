//! Command-line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use autolistener_common::{Error, DEFAULT_ALLOWED_HOSTNAMES_ANNOTATION};
use autolistener_route::{ControllerConfig, GatewayRef, HostnamePolicy};

/// gateway-auto-listener: adds an HTTPS listener to a shared Gateway for every
/// hostname of a cert-manager annotated HTTPRoute
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway-auto-listener", version, about, long_about = None)]
pub struct Cli {
    /// Name of the Gateway to manage
    #[arg(long, env = "GATEWAY_NAME", default_value = "default")]
    pub gateway_name: String,

    /// Namespace of the Gateway; certificate Secrets are created here
    #[arg(long, env = "GATEWAY_NAMESPACE", default_value = "nginx-gateway")]
    pub gateway_namespace: String,

    /// Base domain for per-namespace subdomains (`<host>.<namespace>.<suffix>`)
    #[arg(long, env = "ALLOWED_DOMAIN_SUFFIX", default_value = "")]
    pub allowed_domain_suffix: String,

    /// Only namespaces starting with this prefix have their hostnames validated
    #[arg(long = "validated-ns-prefix", env = "VALIDATED_NS_PREFIX", default_value = "")]
    pub validated_namespace_prefix: String,

    /// Namespace annotation listing extra hostnames a namespace may use
    #[arg(
        long,
        env = "ALLOWED_HOSTNAMES_ANNOTATION",
        default_value = DEFAULT_ALLOWED_HOSTNAMES_ANNOTATION
    )]
    pub allowed_hostnames_annotation: String,

    /// Address the /healthz and /readyz probes bind to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: SocketAddr,

    /// Enable leader election so only one replica reconciles at a time
    #[arg(
        long,
        env = "LEADER_ELECT",
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub leader_elect: bool,

    /// Disable leader election
    #[arg(long = "no-leader-elect")]
    pub no_leader_elect: bool,

    /// Namespace holding the leader election Lease (defaults to the Gateway namespace)
    #[arg(long, env = "POD_NAMESPACE")]
    pub leader_election_namespace: Option<String>,

    /// Path to a kubeconfig file (in-cluster config or KUBECONFIG when unset)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,
}

impl Cli {
    /// Whether leader election should run
    pub fn leader_election_enabled(&self) -> bool {
        self.leader_elect && !self.no_leader_elect
    }

    /// Namespace for the leader election Lease
    pub fn lease_namespace(&self) -> &str {
        self.leader_election_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.gateway_namespace)
    }

    /// Typed engine configuration
    pub fn controller_config(&self) -> Result<ControllerConfig, Error> {
        ControllerConfig::new(
            GatewayRef::new(&self.gateway_name, &self.gateway_namespace),
            HostnamePolicy {
                validated_namespace_prefix: self.validated_namespace_prefix.clone(),
                allowed_domain_suffix: self.allowed_domain_suffix.clone(),
                allowed_hostnames_annotation: self.allowed_hostnames_annotation.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["gateway-auto-listener"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--gateway-name",
            "public",
            "--gateway-namespace",
            "edge",
            "--validated-ns-prefix",
            "tenant-",
            "--allowed-domain-suffix",
            "apps.example.com",
            "--allowed-hostnames-annotation",
            "example.com/hosts",
            "--health-probe-bind-address",
            "127.0.0.1:9000",
            "--leader-election-namespace",
            "ops",
        ]);

        let config = cli.controller_config().unwrap();
        assert_eq!(config.gateway, GatewayRef::new("public", "edge"));
        assert_eq!(config.policy.validated_namespace_prefix, "tenant-");
        assert_eq!(config.policy.allowed_domain_suffix, "apps.example.com");
        assert_eq!(config.policy.allowed_hostnames_annotation, "example.com/hosts");
        assert_eq!(cli.health_probe_bind_address.port(), 9000);
        assert_eq!(cli.lease_namespace(), "ops");
    }

    #[test]
    fn leader_election_can_be_disabled() {
        assert!(!parse(&["--no-leader-elect"]).leader_election_enabled());
        assert!(!parse(&["--leader-elect=false"]).leader_election_enabled());
        assert!(parse(&["--leader-elect"]).leader_election_enabled());
    }

    #[test]
    fn empty_gateway_name_is_rejected() {
        let cli = parse(&["--gateway-name", ""]);
        assert!(matches!(cli.controller_config(), Err(Error::Config { .. })));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
