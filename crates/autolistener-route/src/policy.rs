//! Namespace hostname policy
//!
//! Tenants in validated namespaces may only claim hostnames under their own
//! subdomain, or hostnames the cluster admin granted through an annotation on
//! the namespace. Rules are evaluated in order and the first match wins:
//!
//! 1. no validated-namespace prefix configured: allowed
//! 2. namespace outside the prefix: allowed
//! 3. `<anything>.<namespace>.<suffix>` when a domain suffix is configured: allowed
//! 4. namespace allow-list entry matches exactly or as a parent domain: allowed
//! 5. otherwise denied

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tracing::debug;

use autolistener_common::Error;

use crate::client::KubeClient;

/// Hostname policy settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostnamePolicy {
    /// Namespaces starting with this prefix are validated; empty disables validation
    pub validated_namespace_prefix: String,
    /// Base domain for per-namespace subdomains; empty disables rule 3
    pub allowed_domain_suffix: String,
    /// Namespace annotation holding the comma-separated allow-list
    pub allowed_hostnames_annotation: String,
}

/// Which rule admitted a hostname
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowedBy {
    /// No prefix configured
    ValidationDisabled,
    /// Namespace does not start with the prefix
    UnvalidatedNamespace,
    /// Hostname sits under the namespace's own subdomain
    NamespaceSubdomain,
    /// Namespace allow-list annotation
    AllowList,
}

/// Outcome of evaluating one hostname
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The hostname may get a listener
    Allowed(AllowedBy),
    /// The hostname is rejected
    Denied {
        /// Human-readable reason naming hostname and namespace
        reason: String,
    },
}

impl PolicyDecision {
    /// True for [`PolicyDecision::Allowed`]
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed(_))
    }
}

impl HostnamePolicy {
    /// Rules 1 to 3, which need no namespace lookup
    ///
    /// `None` means the namespace allow-list decides.
    pub fn check_without_namespace(&self, hostname: &str, namespace: &str) -> Option<AllowedBy> {
        if self.validated_namespace_prefix.is_empty() {
            return Some(AllowedBy::ValidationDisabled);
        }
        if !namespace.starts_with(&self.validated_namespace_prefix) {
            return Some(AllowedBy::UnvalidatedNamespace);
        }
        if !self.allowed_domain_suffix.is_empty() {
            let own_domain = format!(".{namespace}.{}", self.allowed_domain_suffix);
            if hostname
                .strip_suffix(own_domain.as_str())
                .is_some_and(|label| !label.is_empty())
            {
                return Some(AllowedBy::NamespaceSubdomain);
            }
        }
        None
    }

    /// Evaluate every rule given the namespace's allow-list
    pub fn decide(&self, hostname: &str, namespace: &str, allow_list: &AllowList) -> PolicyDecision {
        if let Some(by) = self.check_without_namespace(hostname, namespace) {
            return PolicyDecision::Allowed(by);
        }
        if allow_list.permits(hostname) {
            return PolicyDecision::Allowed(AllowedBy::AllowList);
        }
        PolicyDecision::Denied {
            reason: format!("hostname {hostname} is not allowed for namespace {namespace}"),
        }
    }
}

/// Hostnames a namespace has been granted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList(Vec<String>);

impl AllowList {
    /// Parse a comma-separated annotation value. Entries are trimmed; blanks skipped.
    pub fn parse(value: &str) -> Self {
        Self(
            value
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Read the allow-list from a namespace; empty when absent
    pub fn from_namespace(namespace: Option<&Namespace>, annotation: &str) -> Self {
        namespace
            .and_then(|ns| ns.annotations().get(annotation))
            .map(|v| Self::parse(v))
            .unwrap_or_default()
    }

    /// Exact match, or the hostname is a strict subdomain of an entry
    pub fn permits(&self, hostname: &str) -> bool {
        self.0.iter().any(|entry| {
            hostname == entry
                || hostname
                    .strip_suffix(entry.as_str())
                    .is_some_and(|head| head.ends_with('.') && head.len() > 1)
        })
    }
}

/// Evaluates the hostnames of one route.
///
/// The route's namespace is fetched at most once, and only when a hostname
/// reaches the allow-list rule.
pub struct HostnameValidator<'a> {
    policy: &'a HostnamePolicy,
    kube: &'a dyn KubeClient,
    namespace: &'a str,
    allow_list: Option<AllowList>,
}

impl<'a> HostnameValidator<'a> {
    /// Validator for routes in `namespace`
    pub fn new(policy: &'a HostnamePolicy, kube: &'a dyn KubeClient, namespace: &'a str) -> Self {
        Self {
            policy,
            kube,
            namespace,
            allow_list: None,
        }
    }

    /// Evaluate one hostname
    ///
    /// A missing namespace counts as an empty allow-list. Any other lookup
    /// failure fails the pass.
    pub async fn validate(&mut self, hostname: &str) -> Result<PolicyDecision, Error> {
        if let Some(by) = self.policy.check_without_namespace(hostname, self.namespace) {
            return Ok(PolicyDecision::Allowed(by));
        }
        if let Some(list) = &self.allow_list {
            return Ok(self.policy.decide(hostname, self.namespace, list));
        }
        let list = self.load_allow_list().await?;
        let decision = self.policy.decide(hostname, self.namespace, &list);
        self.allow_list = Some(list);
        Ok(decision)
    }

    async fn load_allow_list(&self) -> Result<AllowList, Error> {
        if self.policy.allowed_hostnames_annotation.is_empty() {
            return Ok(AllowList::default());
        }
        let namespace = self.kube.get_namespace(self.namespace).await?;
        if namespace.is_none() {
            debug!(namespace = %self.namespace, "Namespace not found, using empty allow-list");
        }
        Ok(AllowList::from_namespace(
            namespace.as_ref(),
            &self.policy.allowed_hostnames_annotation,
        ))
    }
}
