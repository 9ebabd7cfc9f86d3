//! Rule engine
//!
//! Raw per-domain rule lists from the configuration are compiled into an
//! immutable [`CompiledRuleSet`]. A query is first routed to the most
//! specific configured domain (longest suffix), then that domain's rules are
//! evaluated top to bottom and the first rule whose predicates all hold wins.
//!
//! The active set lives in a [`RuleStore`] and is replaced wholesale on
//! reload; readers always see one complete set.
//!
//! # Example
//!
//! ```rust
//! use dnsfence::config::Config;
//! use dnsfence::rules::{compile, Action};
//!
//! let config = Config::from_yaml(r#"
//! listen: { udp: { address: 127.0.0.1, port: 5353 } }
//! rules:
//!   example.com:
//!     - name: lan
//!       match: { source ips: [10.0.0.0/8] }
//!       then: { action: forward, targets: [1.1.1.1:53] }
//! "#).unwrap();
//!
//! let report = compile(&config.rules);
//! assert!(report.errors.is_empty());
//!
//! let domain = report.ruleset.route("www.example.com.").unwrap();
//! let hit = domain.evaluate(1, "www.example.com.", "10.1.2.3".parse().unwrap()).unwrap();
//! assert_eq!(hit.rule.then.action, Action::Forward);
//! ```

pub mod compiler;
pub mod matcher;
pub mod query_type;
pub mod router;
pub mod store;
pub mod types;

pub use compiler::{canonical_name, compile, CompileError, CompileErrorKind, CompileReport};
pub use store::RuleStore;
pub use types::{Action, CompiledRuleSet, Domain, Match, Rule, RuleMatch, Then};
