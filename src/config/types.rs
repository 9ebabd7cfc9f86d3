//! Configuration type definitions
//!
//! Raw, uncompiled shapes of the configuration file. Rule entries stay as
//! plain strings here; `rules::compiler` turns them into matchers.

use crate::server::Protocol;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Rule lists keyed by (possibly partially qualified) domain name
pub type RulesConfig = BTreeMap<String, Vec<RuleConfig>>;

/// A single listen address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    /// IP literal to bind; empty means all IPv4 interfaces
    #[serde(default)]
    pub address: String,

    /// Port to bind
    pub port: u16,
}

impl Binding {
    /// Create a new binding
    ///
    /// # Example
    ///
    /// ```
    /// use dnsfence::config::types::Binding;
    ///
    /// let binding = Binding::new("127.0.0.1", 5353);
    /// assert_eq!(binding.socket_addr().unwrap().port(), 5353);
    /// ```
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Resolve the binding into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let address = self.address.trim();
        let ip = if address.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            address
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .map_err(|_| Error::invalid_address(address))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// One binding or a list of bindings under a protocol key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Bindings {
    /// `udp: { address: ..., port: ... }`
    One(Binding),
    /// `udp: [ { ... }, { ... } ]`
    Many(Vec<Binding>),
}

impl Bindings {
    /// Borrow the bindings as a slice
    pub fn as_slice(&self) -> &[Binding] {
        match self {
            Bindings::One(b) => std::slice::from_ref(b),
            Bindings::Many(v) => v.as_slice(),
        }
    }
}

/// A resolved listener: transport plus socket address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Transport protocol
    pub protocol: Protocol,

    /// Listen address
    pub addr: SocketAddr,
}

impl std::fmt::Display for ListenerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.protocol, self.addr)
    }
}

/// Raw rule as written in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    /// Rule name, used in logs
    #[serde(default)]
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Match predicates; an empty block matches everything
    #[serde(default, rename = "match")]
    pub matcher: MatchConfig,

    /// Action taken when the rule matches
    #[serde(default)]
    pub then: ThenConfig,
}

/// Raw match block
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchConfig {
    /// Query type mnemonics (A, AAAA, MX, ...)
    #[serde(default, rename = "query types")]
    pub query_types: Vec<String>,

    /// Regular expressions tested against the canonical query name
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Client CIDR ranges
    #[serde(default, rename = "source ips")]
    pub source_ips: Vec<String>,

    /// Constraints on addresses returned by the upstream
    #[serde(default, rename = "answered address")]
    pub answered_address: AnsweredAddressConfig,
}

/// Raw `answered address` block
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnsweredAddressConfig {
    /// CIDR ranges no answered address may fall into
    #[serde(default, rename = "not in")]
    pub not_in: Vec<String>,
}

/// Raw `then` block
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThenConfig {
    /// forward | refused | failed
    #[serde(default)]
    pub action: String,

    /// `ip:port` upstream targets, required for forward
    #[serde(default)]
    pub targets: Vec<String>,
}
