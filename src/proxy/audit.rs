//! Per-query audit events
//!
//! Every query that reaches the policy handler produces exactly one event on
//! the `dnsfence::audit` tracing target, whatever its outcome. With the JSON
//! log format each field becomes a JSON key.

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

/// Tracing target audit events are emitted on
pub const AUDIT_TARGET: &str = "dnsfence::audit";

/// How a query was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No configured domain is a suffix of the name
    NoDomain,
    /// The domain has no rule that holds
    NoRule,
    /// Matched rule says refuse
    Refused,
    /// Matched rule says fail
    Failed,
    /// Upstream reply relayed to the client
    Forwarded,
    /// Upstream reply contained an excluded address and was refused
    Filtered,
    /// Upstream could not be reached in time
    UpstreamError,
    /// Request did not carry exactly one question
    BadQuestionCount,
    /// Request opcode is not a standard query
    NotImplemented,
}

impl Outcome {
    /// Get the string name of this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDomain => "no_domain",
            Self::NoRule => "no_rule",
            Self::Refused => "refused",
            Self::Failed => "failed",
            Self::Forwarded => "forwarded",
            Self::Filtered => "filtered",
            Self::UpstreamError => "upstream_error",
            Self::BadQuestionCount => "bad_question_count",
            Self::NotImplemented => "not_implemented",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Transport the query arrived on
    pub protocol: String,

    /// Client socket address
    pub client: SocketAddr,

    /// Canonical query name
    pub qname: String,

    /// Query type mnemonic
    pub qtype: String,

    /// Routed domain key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Index of the matched rule in its domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,

    /// Name of the matched rule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Outcome
    pub outcome: Outcome,

    /// Upstream target, for forwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<SocketAddr>,

    /// Response code sent to the client
    pub rcode: String,

    /// Response code the upstream sent, for forwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_rcode: Option<String>,

    /// Addresses in the upstream answer section, for forwards
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<IpAddr>,

    /// Address that triggered the response filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded: Option<IpAddr>,

    /// Time spent handling the query
    pub elapsed_ms: u64,
}

impl AuditEvent {
    /// Emit the event at `info` on [`AUDIT_TARGET`]
    pub fn emit(&self) {
        info!(
            target: AUDIT_TARGET,
            protocol = %self.protocol,
            client = %self.client,
            qname = %self.qname,
            qtype = %self.qtype,
            domain = self.domain.as_deref().unwrap_or("-"),
            rule_index = ?self.rule_index,
            rule = self.rule.as_deref().unwrap_or("-"),
            outcome = %self.outcome,
            target = ?self.target,
            rcode = %self.rcode,
            upstream_rcode = ?self.upstream_rcode,
            answers = ?self.answers,
            excluded = ?self.excluded,
            elapsed_ms = self.elapsed_ms,
            "query"
        );
    }
}
