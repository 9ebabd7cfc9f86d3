//! Query dispatch
//!
//! [`PolicyHandler`] is the request handler the listeners call. It reads
//! the active rule set from the [`RuleStore`](crate::rules::RuleStore),
//! answers REFUSED or SERVFAIL itself, or relays the query through a
//! [`Forwarder`] and checks the reply against the rule's excluded ranges.

pub mod audit;
pub mod filter;
pub mod forward;
pub mod handler;

pub use audit::{AuditEvent, Outcome, AUDIT_TARGET};
pub use forward::Forwarder;
pub use handler::PolicyHandler;
