//! Host allow/deny policy
//!
//! Matching is exact hostname equality. A non-empty allow list is
//! authoritative: hosts on it are permitted even when they are also denied,
//! and every other host is rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allow and deny sets of exact hostnames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPolicy {
    /// Hosts that may be fetched; when non-empty, nothing else may
    #[serde(default)]
    pub allow_hosts: BTreeSet<String>,
    /// Hosts that may not be fetched (only consulted when `allow_hosts` is empty)
    #[serde(default)]
    pub deny_hosts: BTreeSet<String>,
}

impl HostPolicy {
    /// Build a policy from allow and deny host lists
    pub fn new<A, D>(allow_hosts: A, deny_hosts: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            allow_hosts: allow_hosts.into_iter().map(Into::into).collect(),
            deny_hosts: deny_hosts.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if `hostname` may be fetched
    pub fn is_allowed(&self, hostname: &str) -> bool {
        is_allowed(hostname, self)
    }
}

/// Returns true if `hostname` may be fetched under `policy`
pub fn is_allowed(hostname: &str, policy: &HostPolicy) -> bool {
    if !policy.allow_hosts.is_empty() {
        return policy.allow_hosts.contains(hostname);
    }
    !policy.deny_hosts.contains(hostname)
}
