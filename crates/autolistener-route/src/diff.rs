//! Listener diff: which listeners a route needs added and which of its
//! recorded listeners must go. Pure; no I/O.

use std::collections::{BTreeMap, BTreeSet};

use autolistener_common::network::GatewayListener;

use crate::listener::{build_listener, listener_name, ManagedListeners};

/// A derived listener name that is taken by a listener for another hostname
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameConflict {
    /// Route hostname that could not be served
    pub hostname: String,
    /// Derived listener name
    pub listener: String,
    /// Hostname of the listener already holding the name
    pub existing_hostname: Option<String>,
}

/// Result of diffing a route against the Gateway
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListenerDiff {
    /// Listeners to append, in hostname order
    pub to_add: Vec<GatewayListener>,
    /// Names of recorded listeners to remove
    pub to_remove: BTreeSet<String>,
    /// Recorded set to persist on the route after a successful patch
    pub recorded: ManagedListeners,
    /// Hostnames skipped because their listener name is taken
    pub conflicts: Vec<NameConflict>,
}

impl ListenerDiff {
    /// True if the Gateway needs no change
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff desired hostnames against the recorded set and the current listeners.
///
/// A derived name already present on the Gateway with the same hostname is
/// satisfied and recorded. Present with another hostname, it is a conflict:
/// nothing is added, and the name is neither recorded nor removed. Existing
/// listeners are never rewritten.
pub fn compute(
    desired: &[String],
    recorded: &ManagedListeners,
    current: &[GatewayListener],
    secret_namespace: &str,
) -> ListenerDiff {
    let existing: BTreeMap<&str, Option<&str>> = current
        .iter()
        .map(|l| (l.name.as_str(), l.hostname.as_deref()))
        .collect();

    let mut diff = ListenerDiff::default();
    let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
    let mut conflicting: BTreeSet<String> = BTreeSet::new();

    for hostname in desired {
        let name = listener_name(hostname);

        if let Some(owner) = claimed.get(&name) {
            if *owner != hostname.as_str() {
                diff.conflicts.push(NameConflict {
                    hostname: hostname.clone(),
                    listener: name,
                    existing_hostname: Some(owner.to_string()),
                });
            }
            continue;
        }

        match existing.get(name.as_str()) {
            Some(Some(existing_hostname)) if *existing_hostname == hostname.as_str() => {
                diff.recorded.insert(name.clone());
            }
            Some(existing_hostname) => {
                diff.conflicts.push(NameConflict {
                    hostname: hostname.clone(),
                    listener: name.clone(),
                    existing_hostname: existing_hostname.map(str::to_string),
                });
                conflicting.insert(name.clone());
            }
            None => {
                diff.to_add.push(build_listener(hostname, secret_namespace));
                diff.recorded.insert(name.clone());
            }
        }
        claimed.insert(name, hostname);
    }

    diff.to_remove = recorded
        .iter()
        .filter(|name| !diff.recorded.contains(name) && !conflicting.contains(*name))
        .map(str::to_string)
        .collect();

    diff
}

/// Diff for a route going away: every recorded listener is removed
pub fn compute_removal(recorded: &ManagedListeners) -> ListenerDiff {
    ListenerDiff {
        to_remove: recorded.iter().map(str::to_string).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "nginx-gateway";

    fn hostnames(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    fn recorded(names: &[&str]) -> ManagedListeners {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn manual(name: &str, hostname: Option<&str>) -> GatewayListener {
        GatewayListener {
            name: name.to_string(),
            hostname: hostname.map(str::to_string),
            port: 80,
            protocol: "HTTP".to_string(),
            ..Default::default()
        }
    }

    fn names(listeners: &[GatewayListener]) -> Vec<&str> {
        listeners.iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn new_route_adds_one_listener_per_hostname() {
        let diff = compute(
            &hostnames(&["a.example.com", "b.example.com"]),
            &ManagedListeners::default(),
            &[manual("http", None)],
            NS,
        );
        assert_eq!(names(&diff.to_add), vec!["https-a-example-com", "https-b-example-com"]);
        assert!(diff.to_remove.is_empty());
        assert_eq!(diff.recorded.to_annotation(), "https-a-example-com,https-b-example-com");
    }

    #[test]
    fn changed_hostnames_add_and_remove() {
        let current = vec![
            build_listener("a.example.com", NS),
            build_listener("b.example.com", NS),
        ];
        let diff = compute(
            &hostnames(&["b.example.com", "c.example.com"]),
            &recorded(&["https-a-example-com", "https-b-example-com"]),
            &current,
            NS,
        );
        assert_eq!(names(&diff.to_add), vec!["https-c-example-com"]);
        assert_eq!(
            diff.to_remove.iter().collect::<Vec<_>>(),
            vec!["https-a-example-com"]
        );
        assert_eq!(diff.recorded.to_annotation(), "https-b-example-com,https-c-example-com");
    }

    #[test]
    fn satisfied_route_produces_empty_diff() {
        let current = vec![build_listener("a.example.com", NS)];
        let diff = compute(
            &hostnames(&["a.example.com"]),
            &recorded(&["https-a-example-com"]),
            &current,
            NS,
        );
        assert!(diff.is_empty());
        assert_eq!(diff.recorded, recorded(&["https-a-example-com"]));
    }

    #[test]
    fn duplicate_hostnames_add_once() {
        let diff = compute(
            &hostnames(&["a.example.com", "a.example.com"]),
            &ManagedListeners::default(),
            &[],
            NS,
        );
        assert_eq!(diff.to_add.len(), 1);
        assert!(diff.conflicts.is_empty());
    }

    #[test]
    fn listener_missing_from_gateway_is_recreated() {
        let diff = compute(
            &hostnames(&["a.example.com"]),
            &recorded(&["https-a-example-com"]),
            &[],
            NS,
        );
        assert_eq!(names(&diff.to_add), vec!["https-a-example-com"]);
        assert!(diff.to_remove.is_empty());
    }

    // =========================================================================
    // Name collisions
    // =========================================================================

    #[test]
    fn name_taken_by_other_hostname_is_a_conflict() {
        // "a-b.example.com" and "a.b.example.com" both map to https-a-b-example-com
        let current = vec![build_listener("a-b.example.com", NS)];
        let diff = compute(&hostnames(&["a.b.example.com"]), &ManagedListeners::default(), &current, NS);

        assert!(diff.to_add.is_empty());
        assert!(diff.recorded.is_empty());
        assert_eq!(
            diff.conflicts,
            vec![NameConflict {
                hostname: "a.b.example.com".to_string(),
                listener: "https-a-b-example-com".to_string(),
                existing_hostname: Some("a-b.example.com".to_string()),
            }]
        );
    }

    #[test]
    fn manual_listener_without_hostname_is_never_claimed() {
        let current = vec![manual("https-example-com", None)];
        let diff = compute(&hostnames(&["example.com"]), &ManagedListeners::default(), &current, NS);
        assert!(diff.to_add.is_empty());
        assert!(diff.recorded.is_empty());
        assert_eq!(diff.conflicts.len(), 1);
    }

    #[test]
    fn conflicting_recorded_name_is_not_removed() {
        // Recorded earlier, then the listener was rewritten for another hostname
        let current = vec![manual("https-a-example-com", Some("other.example.com"))];
        let diff = compute(
            &hostnames(&["a.example.com"]),
            &recorded(&["https-a-example-com"]),
            &current,
            NS,
        );
        assert!(diff.to_remove.is_empty());
        assert!(diff.recorded.is_empty());
    }

    #[test]
    fn colliding_hostnames_within_one_route() {
        let diff = compute(
            &hostnames(&["a-b.example.com", "a.b.example.com"]),
            &ManagedListeners::default(),
            &[],
            NS,
        );
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].hostname.as_deref(), Some("a-b.example.com"));
        assert_eq!(diff.conflicts.len(), 1);
        assert_eq!(diff.conflicts[0].hostname, "a.b.example.com");
    }

    // =========================================================================
    // Removal
    // =========================================================================

    #[test]
    fn removal_drops_whole_recorded_set() {
        let diff = compute_removal(&recorded(&["https-a-example-com", "https-b-example-com"]));
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove.len(), 2);
        assert!(diff.recorded.is_empty());
    }
}
