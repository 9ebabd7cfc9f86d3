//! Rule evaluation
//!
//! A rule holds when every non-empty predicate group holds. Within a group
//! any single entry is enough. Groups are checked cheapest first: query
//! type, then client address, then the patterns.

use super::types::{Domain, Match, Rule, RuleMatch};
use std::net::IpAddr;

impl Match {
    /// True if `qtype` is listed, or no types are configured
    pub fn matches_query_type(&self, qtype: u16) -> bool {
        self.query_types.is_empty() || self.query_types.contains(&qtype)
    }

    /// True if `source` is in one of the ranges, or no ranges are configured
    ///
    /// IPv4-mapped IPv6 clients are compared as their IPv4 address.
    pub fn matches_source(&self, source: IpAddr) -> bool {
        if self.source_ips.is_empty() {
            return true;
        }
        let source = unmap(source);
        self.source_ips.iter().any(|net| net.contains(&source))
    }

    /// True if any pattern is found in `name`, or no patterns are configured
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(name))
    }

    /// Evaluate all request-side predicate groups
    pub fn matches(&self, qtype: u16, name: &str, source: IpAddr) -> bool {
        self.matches_query_type(qtype) && self.matches_source(source) && self.matches_name(name)
    }

    /// True if `addr` falls in one of the `answered address: not in` ranges
    pub fn answer_excluded(&self, addr: IpAddr) -> bool {
        let addr = unmap(addr);
        self.answered_not_in.iter().any(|net| net.contains(&addr))
    }
}

impl Rule {
    /// Evaluate the rule against a query
    pub fn matches(&self, qtype: u16, name: &str, source: IpAddr) -> bool {
        self.matcher.matches(qtype, name, source)
    }
}

impl Domain {
    /// Return the first rule, in configuration order, that holds
    pub fn evaluate(&self, qtype: u16, name: &str, source: IpAddr) -> Option<RuleMatch<'_>> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(qtype, name, source))
            .map(|(index, rule)| RuleMatch { index, rule })
    }
}

fn unmap(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::types::{Action, Then};
    use regex::Regex;

    fn rule(name: &str, matcher: Match, action: Action) -> Rule {
        Rule {
            name: name.to_string(),
            description: String::new(),
            matcher,
            then: Then {
                action,
                targets: vec!["1.1.1.1:53".parse().unwrap()],
            },
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn nets(list: &[&str]) -> Vec<ipnet::IpNet> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let m = Match::default();
        assert!(m.matches(1, "a.example.com.", ip("192.0.2.1")));
        assert!(m.matches(65535, ".", ip("::1")));
    }

    #[test]
    fn test_query_type_group() {
        let m = Match {
            query_types: vec![1, 28],
            ..Default::default()
        };
        assert!(m.matches(1, "x.", ip("10.0.0.1")));
        assert!(m.matches(28, "x.", ip("10.0.0.1")));
        assert!(!m.matches(15, "x.", ip("10.0.0.1")));
    }

    #[test]
    fn test_source_group() {
        let m = Match {
            source_ips: nets(&["10.0.0.0/8", "2001:db8::/32"]),
            ..Default::default()
        };
        assert!(m.matches_source(ip("10.200.1.1")));
        assert!(m.matches_source(ip("2001:db8::53")));
        assert!(!m.matches_source(ip("192.168.1.1")));
        assert!(!m.matches_source(ip("2001:db9::1")));
    }

    #[test]
    fn test_mapped_source_is_unmapped() {
        let m = Match {
            source_ips: nets(&["10.0.0.0/8"]),
            ..Default::default()
        };
        assert!(m.matches_source(ip("::ffff:10.1.2.3")));
        assert!(!m.matches_source(ip("::ffff:192.168.1.1")));
    }

    #[test]
    fn test_pattern_group_searches_name() {
        let m = Match {
            patterns: vec![Regex::new("ads").unwrap(), Regex::new(r"^www\.").unwrap()],
            ..Default::default()
        };
        assert!(m.matches_name("cdn.ads.example.com."));
        assert!(m.matches_name("www.example.com."));
        assert!(!m.matches_name("mail.example.com."));
    }

    #[test]
    fn test_all_groups_must_hold() {
        let m = Match {
            query_types: vec![1],
            patterns: vec![Regex::new("^www").unwrap()],
            source_ips: nets(&["10.0.0.0/8"]),
            answered_not_in: Vec::new(),
        };
        assert!(m.matches(1, "www.example.com.", ip("10.0.0.1")));
        assert!(!m.matches(28, "www.example.com.", ip("10.0.0.1")));
        assert!(!m.matches(1, "mail.example.com.", ip("10.0.0.1")));
        assert!(!m.matches(1, "www.example.com.", ip("172.16.0.1")));
    }

    #[test]
    fn test_first_match_wins_in_order() {
        let mut domain = Domain::new("example.com.");
        domain.rules.push(rule(
            "lan",
            Match {
                source_ips: nets(&["10.0.0.0/8"]),
                ..Default::default()
            },
            Action::Forward,
        ));
        domain.rules.push(rule("rest", Match::default(), Action::Refuse));
        domain.rules.push(rule("never", Match::default(), Action::Fail));

        let hit = domain.evaluate(1, "example.com.", ip("10.1.1.1")).unwrap();
        assert_eq!(hit.index, 0);
        assert_eq!(hit.rule.name, "lan");

        let hit = domain.evaluate(1, "example.com.", ip("8.8.8.8")).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.rule.then.action, Action::Refuse);
    }

    #[test]
    fn test_no_rule_holds() {
        let mut domain = Domain::new("example.com.");
        domain.rules.push(rule(
            "mx only",
            Match {
                query_types: vec![15],
                ..Default::default()
            },
            Action::Refuse,
        ));
        assert!(domain.evaluate(1, "example.com.", ip("10.0.0.1")).is_none());
        assert!(Domain::new("empty.").evaluate(1, "empty.", ip("10.0.0.1")).is_none());
    }

    #[test]
    fn test_answer_excluded() {
        let m = Match {
            answered_not_in: nets(&["127.0.0.0/8", "::1/128"]),
            ..Default::default()
        };
        assert!(m.answer_excluded(ip("127.0.0.1")));
        assert!(m.answer_excluded(ip("::1")));
        assert!(!m.answer_excluded(ip("93.184.216.34")));
        assert!(!Match::default().answer_excluded(ip("127.0.0.1")));
    }
}
