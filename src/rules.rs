// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Redirect rule matching
//!
//! Rules come in two shapes: exact domains (`foo.example.com`) and wildcards
//! (`*.example.com`). Both are normalized to lowercase FQDNs with a trailing
//! dot before lookup. Wildcards match any name ending in `.suffix` as well
//! as the bare apex.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::RedirectRule;

/// Normalize a domain name for map lookups: lowercase, trailing dot
pub fn normalize_name(name: &str) -> String {
    let mut name = name.to_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// The resolver's derived lookup state. Rebuilt as a whole on reload and
/// swapped in atomically; never mutated in place.
#[derive(Debug, Default, Clone)]
pub struct RewriteMaps {
    /// Normalized FQDN -> target
    exact: BTreeMap<String, IpAddr>,
    /// Normalized wildcard suffix (the part after `*.`) -> target
    wildcard: BTreeMap<String, IpAddr>,
}

impl RewriteMaps {
    /// Build the lookup maps from the enabled rule set. Disabled rules must
    /// be filtered out by the caller; rules with unparseable targets are
    /// skipped with a warning. Duplicate suffixes: last rule wins.
    pub fn build(rules: &[RedirectRule]) -> Self {
        let mut maps = Self::default();

        for rule in rules {
            let target: IpAddr = match rule.target.parse() {
                Ok(ip) => ip,
                Err(_) => {
                    tracing::warn!(
                        "Skipping redirect {}: invalid target IP {:?}",
                        rule.domain,
                        rule.target
                    );
                    continue;
                }
            };

            let domain = normalize_name(&rule.domain);
            if let Some(suffix) = domain.strip_prefix("*.") {
                tracing::debug!("Added wildcard redirect: *.{} -> {}", suffix, target);
                maps.wildcard.insert(suffix.to_string(), target);
            } else {
                tracing::debug!("Added exact redirect: {} -> {}", domain, target);
                maps.exact.insert(domain, target);
            }
        }

        maps
    }

    /// Look up the target for a query name. Exact entries win over
    /// wildcards; a wildcard matches `.suffix` endings and the bare apex.
    pub fn lookup(&self, query_name: &str) -> Option<IpAddr> {
        let name = normalize_name(query_name);

        if let Some(target) = self.exact.get(&name) {
            return Some(*target);
        }

        for (suffix, target) in &self.wildcard {
            if name == *suffix || name.ends_with(&format!(".{suffix}")) {
                return Some(*target);
            }
        }

        None
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }

    /// Exact entries as display strings, for the status snapshot
    pub fn exact_view(&self) -> BTreeMap<String, String> {
        self.exact
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    /// Wildcard entries as display strings, for the status snapshot
    pub fn wildcard_view(&self) -> BTreeMap<String, String> {
        self.wildcard
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}
