//! Domain routing
//!
//! Picks the configured domain that governs a query name: the longest key
//! the name ends with. Keys and names are both canonical (lowercase, trailing
//! dot), and the comparison is a plain byte suffix test.

use super::types::{CompiledRuleSet, Domain};

impl CompiledRuleSet {
    /// Route a canonical query name to its most specific domain
    ///
    /// Returns `None` when no key is a suffix of `name`. The root key `"."`
    /// is a suffix of every canonical name and acts as a catch-all.
    pub fn route(&self, name: &str) -> Option<&Domain> {
        self.domains()
            .filter(|domain| name.ends_with(domain.name.as_str()))
            .max_by_key(|domain| domain.name.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> CompiledRuleSet {
        let mut set = CompiledRuleSet::new();
        for key in keys {
            set.insert(Domain::new(*key));
        }
        set
    }

    fn routed<'a>(set: &'a CompiledRuleSet, name: &str) -> Option<&'a str> {
        set.route(name).map(|d| d.name.as_str())
    }

    #[test]
    fn test_longest_suffix_wins() {
        let set = set(&["com.", "example.com.", "a.example.com."]);
        assert_eq!(routed(&set, "b.a.example.com."), Some("a.example.com."));
        assert_eq!(routed(&set, "a.example.com."), Some("a.example.com."));
        assert_eq!(routed(&set, "x.example.com."), Some("example.com."));
        assert_eq!(routed(&set, "example.com."), Some("example.com."));
        assert_eq!(routed(&set, "other.com."), Some("com."));
    }

    #[test]
    fn test_no_match() {
        let set = set(&["example.com."]);
        assert_eq!(routed(&set, "example.org."), None);
        assert_eq!(routed(&set, "com."), None);
        assert_eq!(routed(&CompiledRuleSet::new(), "example.com."), None);
    }

    #[test]
    fn test_root_is_catch_all() {
        let set = set(&[".", "example.com."]);
        assert_eq!(routed(&set, "example.org."), Some("."));
        assert_eq!(routed(&set, "www.example.com."), Some("example.com."));
    }

    #[test]
    fn test_suffix_is_bytewise() {
        // No label boundary check
        let set = set(&["example.com."]);
        assert_eq!(routed(&set, "notexample.com."), Some("example.com."));
    }

    #[test]
    fn test_empty_domain_still_routes() {
        // Routing is by key alone; an empty domain still captures its names
        let set = set(&["com.", "example.com."]);
        let domain = set.route("www.example.com.").unwrap();
        assert!(domain.rules.is_empty());
        assert_eq!(domain.name, "example.com.");
    }
}
