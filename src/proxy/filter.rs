//! Forwarded response filter
//!
//! A rule's `answered address: not in` ranges veto an upstream reply when
//! any address record in its answer section falls inside one of them.

use crate::dns::{Message, RData};
use crate::rules::Match;
use std::net::IpAddr;

/// Addresses carried by A and AAAA records in the answer section
pub fn answer_addresses(response: &Message) -> Vec<IpAddr> {
    response
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect()
}

/// First answered address that the rule excludes, if any
pub fn excluded_address(addresses: &[IpAddr], matcher: &Match) -> Option<IpAddr> {
    if matcher.answered_not_in.is_empty() {
        return None;
    }
    addresses
        .iter()
        .copied()
        .find(|addr| matcher.answer_excluded(*addr))
}
