//! Rule compiler
//!
//! Turns the raw `rules` section into a [`CompiledRuleSet`]. Each rule is
//! compiled independently: a rule with any bad entry is left out entirely,
//! and compilation carries on with its siblings and the remaining domains.
//! Every problem found is returned so operators see the whole picture in
//! one pass.

use super::query_type::parse_query_type;
use super::types::{Action, CompiledRuleSet, Domain, Match, Rule, Then};
use crate::config::{RuleConfig, RulesConfig};
use crate::{Error, Result};
use ipnet::IpNet;
use regex::Regex;
use std::fmt;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Which part of a rule failed to compile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// `match.patterns` entry is not a valid regular expression
    Pattern,
    /// `match.source ips` entry is not a CIDR
    SourceIp,
    /// `match.answered address.not in` entry is not a CIDR
    AnsweredAddress,
    /// `match.query types` entry is not a known type
    QueryType,
    /// `then.action` is not forward/refused/failed
    Action,
    /// `then.targets` entry is not `ip:port`
    Target,
    /// forward action without a single valid target
    ForwardWithoutTarget,
    /// Two configuration keys canonicalize to the same domain
    DuplicateDomain,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pattern => "pattern",
            Self::SourceIp => "source ip",
            Self::AnsweredAddress => "answered address",
            Self::QueryType => "query type",
            Self::Action => "action",
            Self::Target => "target",
            Self::ForwardWithoutTarget => "forward without target",
            Self::DuplicateDomain => "duplicate domain",
        };
        f.write_str(s)
    }
}

/// A single compile problem with its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// Canonical domain key
    pub domain: String,
    /// Position of the rule in the domain's list, if rule-scoped
    pub rule_index: Option<usize>,
    /// Rule name, if rule-scoped
    pub rule_name: String,
    /// Failing field
    pub kind: CompileErrorKind,
    /// Offending input
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

impl CompileError {
    /// Join errors into one line for logs and `Error::Compile`
    pub fn summary(errors: &[CompileError]) -> String {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule_index {
            Some(idx) => write!(
                f,
                "{} rule #{} '{}': {} '{}': {}",
                self.domain, idx, self.rule_name, self.kind, self.input, self.reason
            ),
            None => write!(
                f,
                "{}: {} '{}': {}",
                self.domain, self.kind, self.input, self.reason
            ),
        }
    }
}

impl std::error::Error for CompileError {}

/// Result of compiling a `rules` section
#[derive(Debug, Default)]
pub struct CompileReport {
    /// Everything that compiled; rules with errors are absent
    pub ruleset: CompiledRuleSet,
    /// All problems, in domain then rule order
    pub errors: Vec<CompileError>,
}

impl CompileReport {
    /// True when nothing was dropped
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of rules left out because of errors
    pub fn dropped_rules(&self) -> usize {
        let mut seen: Vec<(&str, usize)> = self
            .errors
            .iter()
            .filter_map(|e| e.rule_index.map(|i| (e.domain.as_str(), i)))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Accept or reject the compiled set
    ///
    /// With `allow_partial` a set with dropped rules is accepted; otherwise
    /// any error rejects the whole set.
    pub fn into_ruleset(self, allow_partial: bool) -> Result<CompiledRuleSet> {
        if self.errors.is_empty() || allow_partial {
            Ok(self.ruleset)
        } else {
            Err(Error::Compile(self.errors))
        }
    }
}

/// Canonicalize a domain or query name
///
/// Lowercase with a trailing dot; the empty name becomes the root `"."`.
///
/// # Example
///
/// ```
/// use dnsfence::rules::canonical_name;
///
/// assert_eq!(canonical_name("Example.COM"), "example.com.");
/// assert_eq!(canonical_name("example.com."), "example.com.");
/// assert_eq!(canonical_name(""), ".");
/// ```
pub fn canonical_name(name: &str) -> String {
    let mut out = name.trim().to_ascii_lowercase();
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

/// Compile the `rules` section of a configuration
pub fn compile(rules: &RulesConfig) -> CompileReport {
    let mut report = CompileReport::default();

    for (key, raw_rules) in rules {
        let name = canonical_name(key);
        let mut domain = Domain::new(name.clone());

        for (index, raw) in raw_rules.iter().enumerate() {
            match compile_rule(&name, index, raw) {
                Ok(rule) => domain.rules.push(rule),
                Err(mut errs) => {
                    warn!(
                        domain = %name,
                        rule_index = index,
                        rule = %raw.name,
                        errors = errs.len(),
                        "rule dropped"
                    );
                    report.errors.append(&mut errs);
                }
            }
        }

        debug!(domain = %name, rules = domain.rules.len(), "compiled domain");

        if !report.ruleset.insert(domain) {
            warn!(domain = %name, key = %key, "domain configured twice");
            report.errors.push(CompileError {
                domain: name,
                rule_index: None,
                rule_name: String::new(),
                kind: CompileErrorKind::DuplicateDomain,
                input: key.clone(),
                reason: "another key already maps to this domain".to_string(),
            });
        }
    }

    report
}

/// Compile a single raw rule, collecting every error it has
pub fn compile_rule(
    domain: &str,
    index: usize,
    raw: &RuleConfig,
) -> std::result::Result<Rule, Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut error = |kind: CompileErrorKind, input: &str, reason: String| {
        warn!(
            domain = %domain,
            rule_index = index,
            rule = %raw.name,
            kind = %kind,
            input = %input,
            reason = %reason,
            "rule compile error"
        );
        errors.push(CompileError {
            domain: domain.to_string(),
            rule_index: Some(index),
            rule_name: raw.name.clone(),
            kind,
            input: input.to_string(),
            reason,
        });
    };

    let mut matcher = Match::default();

    for pattern in &raw.matcher.patterns {
        match Regex::new(pattern) {
            Ok(re) => matcher.patterns.push(re),
            Err(e) => error(CompileErrorKind::Pattern, pattern, e.to_string()),
        }
    }

    for cidr in &raw.matcher.source_ips {
        match parse_cidr(cidr) {
            Ok(net) => matcher.source_ips.push(net),
            Err(reason) => error(CompileErrorKind::SourceIp, cidr, reason),
        }
    }

    for qtype in &raw.matcher.query_types {
        match parse_query_type(qtype) {
            Some(code) => matcher.query_types.push(code),
            None => error(
                CompileErrorKind::QueryType,
                qtype,
                "unknown query type".to_string(),
            ),
        }
    }

    for cidr in &raw.matcher.answered_address.not_in {
        match parse_cidr(cidr) {
            Ok(net) => matcher.answered_not_in.push(net),
            Err(reason) => error(CompileErrorKind::AnsweredAddress, cidr, reason),
        }
    }

    let action = match raw.then.action.parse::<Action>() {
        Ok(action) => Some(action),
        Err(reason) => {
            error(CompileErrorKind::Action, &raw.then.action, reason);
            None
        }
    };

    let mut targets = Vec::new();
    for target in &raw.then.targets {
        match target.trim().parse::<SocketAddr>() {
            Ok(addr) => targets.push(addr),
            Err(_) => error(
                CompileErrorKind::Target,
                target,
                "expected ip:port".to_string(),
            ),
        }
    }

    if action == Some(Action::Forward) && targets.is_empty() {
        error(
            CompileErrorKind::ForwardWithoutTarget,
            &raw.then.action,
            "forward needs at least one valid target".to_string(),
        );
    }

    match action {
        Some(action) if errors.is_empty() => Ok(Rule {
            name: raw.name.clone(),
            description: raw.description.clone(),
            matcher,
            then: Then { action, targets },
        }),
        _ => Err(errors),
    }
}

/// Parse a CIDR range; a bare address is not accepted
fn parse_cidr(input: &str) -> std::result::Result<IpNet, String> {
    input
        .trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|e| e.to_string())
}
