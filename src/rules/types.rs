//! Compiled rule data model
//!
//! Everything here is immutable once built. Patterns and CIDR ranges are
//! owned by their rule and hold no references into the configuration.

use ipnet::IpNet;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Terminal action of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Relay the query to one of the rule's targets
    Forward,
    /// Answer REFUSED
    Refuse,
    /// Answer SERVFAIL
    Fail,
}

impl Action {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Forward => "forward",
            Action::Refuse => "refuse",
            Action::Fail => "fail",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts `forward`, `refuse`/`refused` and `fail`/`failed`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Action::Forward),
            "refuse" | "refused" => Ok(Action::Refuse),
            "fail" | "failed" => Ok(Action::Fail),
            other => Err(format!(
                "unknown action '{}', expected forward, refused or failed",
                other
            )),
        }
    }
}

/// Outcome of a rule: action plus resolved upstream targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Then {
    /// Action to execute
    pub action: Action,
    /// Upstream targets; non-empty when `action` is forward
    pub targets: Vec<SocketAddr>,
}

impl Then {
    /// Pick one target uniformly at random
    pub fn pick_target(&self) -> Option<SocketAddr> {
        self.targets.choose(&mut rand::thread_rng()).copied()
    }
}

/// Compiled match predicates
///
/// An empty list is a wildcard for its predicate group.
#[derive(Debug, Clone, Default)]
pub struct Match {
    /// Query type codes
    pub query_types: Vec<u16>,
    /// Patterns searched in the canonical query name
    pub patterns: Vec<Regex>,
    /// Client address ranges
    pub source_ips: Vec<IpNet>,
    /// Ranges no forwarded answer address may fall into
    pub answered_not_in: Vec<IpNet>,
}

/// A compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Rule name from the configuration
    pub name: String,
    /// Rule description from the configuration
    pub description: String,
    /// Predicates
    pub matcher: Match,
    /// Action
    pub then: Then,
}

/// A routed domain with its ordered rules
#[derive(Debug, Clone)]
pub struct Domain {
    /// Lowercase, fully-qualified key (trailing dot)
    pub name: String,
    /// Rules in configuration order
    pub rules: Vec<Rule>,
}

impl Domain {
    /// Create an empty domain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }
}

/// A rule selected by evaluation, with its position in the domain
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    /// Zero-based index in the domain's rule list
    pub index: usize,
    /// The matching rule
    pub rule: &'a Rule,
}

/// Immutable set of routed domains
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    domains: HashMap<String, Domain>,
}

impl CompiledRuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain; returns false if the key was already present
    pub(crate) fn insert(&mut self, domain: Domain) -> bool {
        if self.domains.contains_key(&domain.name) {
            return false;
        }
        self.domains.insert(domain.name.clone(), domain);
        true
    }

    /// Look up a domain by its exact key
    pub fn get(&self, key: &str) -> Option<&Domain> {
        self.domains.get(key)
    }

    /// Iterate over all domains (unordered)
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    /// Number of domains
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// True if no domain is configured
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Total number of compiled rules across all domains
    pub fn rule_count(&self) -> usize {
        self.domains.values().map(|d| d.rules.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_str() {
        assert_eq!("forward".parse::<Action>().unwrap(), Action::Forward);
        assert_eq!("Refused".parse::<Action>().unwrap(), Action::Refuse);
        assert_eq!("refuse".parse::<Action>().unwrap(), Action::Refuse);
        assert_eq!("FAILED".parse::<Action>().unwrap(), Action::Fail);
        assert_eq!("fail".parse::<Action>().unwrap(), Action::Fail);
        assert!("drop".parse::<Action>().is_err());
        assert!("".parse::<Action>().is_err());
    }

    #[test]
    fn test_pick_target_from_own_list() {
        let then = Then {
            action: Action::Forward,
            targets: vec![
                "1.1.1.1:53".parse().unwrap(),
                "9.9.9.9:53".parse().unwrap(),
                "[2606:4700::1111]:53".parse().unwrap(),
            ],
        };
        for _ in 0..200 {
            let picked = then.pick_target().unwrap();
            assert!(then.targets.contains(&picked));
        }

        let empty = Then {
            action: Action::Refuse,
            targets: Vec::new(),
        };
        assert!(empty.pick_target().is_none());
    }

    #[test]
    fn test_ruleset_insert_rejects_duplicate_key() {
        let mut set = CompiledRuleSet::new();
        assert!(set.insert(Domain::new("example.com.")));
        assert!(!set.insert(Domain::new("example.com.")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.rule_count(), 0);
    }
}
