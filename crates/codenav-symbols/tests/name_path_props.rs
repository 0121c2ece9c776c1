//! Property tests for the name-path pattern grammar.

#![allow(clippy::unwrap_used)]

use codenav_symbols::{NamePathComponent, NamePathPattern};
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,8}"
}

fn chain() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(identifier(), 1..5)
}

fn components(names: &[String]) -> Vec<NamePathComponent> {
    names.iter().map(|n| NamePathComponent::plain(n.clone())).collect()
}

proptest! {
    #[test]
    fn any_suffix_matches_relatively(names in chain(), start in 0usize..4) {
        let start = start.min(names.len() - 1);
        let suffix = &names[start..];
        let pattern = NamePathPattern::parse(&suffix.join("/")).unwrap();
        prop_assert!(pattern.matches(&components(&names), false));
    }

    #[test]
    fn full_chain_matches_absolutely(names in chain()) {
        let pattern = NamePathPattern::parse(&format!("/{}", names.join("/"))).unwrap();
        prop_assert!(pattern.matches(&components(&names), false));
    }

    #[test]
    fn absolute_proper_suffix_never_matches(names in chain(), start in 1usize..4) {
        prop_assume!(names.len() >= 2);
        let start = start.min(names.len() - 1);
        let suffix = &names[start..];
        let pattern = NamePathPattern::parse(&format!("/{}", suffix.join("/"))).unwrap();
        prop_assert!(!pattern.matches(&components(&names), false));
    }

    #[test]
    fn substring_mode_is_weaker_or_equal(names in chain(), pat in identifier()) {
        let pattern = NamePathPattern::parse(&pat).unwrap();
        let subject = components(&names);
        if pattern.matches(&subject, false) {
            prop_assert!(pattern.matches(&subject, true));
        }
    }

    #[test]
    fn trailing_slash_never_changes_matching(names in chain(), start in 0usize..4) {
        let start = start.min(names.len() - 1);
        let text = names[start..].join("/");
        let plain = NamePathPattern::parse(&text).unwrap();
        let slashed = NamePathPattern::parse(&format!("{}/", text)).unwrap();
        let subject = components(&names);
        prop_assert_eq!(plain.matches(&subject, false), slashed.matches(&subject, false));
    }
}
