//! Property-Based Tests for packlist
//!
//! These tests verify:
//! - Flag token round-trips (Display -> parse)
//! - Parsing determinism and comment stripping
//! - Registry ordering and name uniqueness
//! - Hostname exclusion invariants

use proptest::prelude::*;
use std::collections::BTreeSet;

use packlist::parser::strip_comment;
use packlist::{host_matches, parse_document, Bucket, Flag, ParseError};
use strum::IntoEnumIterator;

// =============================================================================
// Flag Property Tests
// =============================================================================

fn flag_strategy() -> impl Strategy<Value = Flag> {
    proptest::sample::select(Flag::iter().collect::<Vec<_>>())
}

proptest! {
    /// Flag: to_string -> parse round-trip is identity, in any letter case
    #[test]
    fn flag_roundtrip(flag in flag_strategy(), upper in any::<bool>()) {
        let token = if upper { flag.to_string().to_uppercase() } else { flag.to_string() };
        prop_assert_eq!(Flag::parse_token(&token), Some(flag));
    }
}

// =============================================================================
// Parser Property Tests
// =============================================================================

/// Unit names: no colon, no whitespace, no comment or quote characters.
fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9+.-]{0,15}"
}

/// A unit line, optionally carrying a lead/trail flag.
fn unit_strategy() -> impl Strategy<Value = (String, Option<Bucket>)> {
    (
        name_strategy(),
        prop_oneof![Just(None), Just(Some(Bucket::Lead)), Just(Some(Bucket::Trail))],
    )
}

fn render(units: &[(String, Option<Bucket>)]) -> String {
    let mut doc = String::new();
    for (name, bucket) in units {
        match bucket {
            Some(bucket) => doc.push_str(&format!("{}:\n  flags: {}\n", name, bucket)),
            None => doc.push_str(&format!("{}\n", name)),
        }
    }
    doc
}

proptest! {
    /// Parsing the same text twice yields the same units or the same error
    #[test]
    fn parse_is_deterministic(text in "[a-z:#\" \n\\\\,-]{0,120}") {
        prop_assert_eq!(parse_document(&text), parse_document(&text));
    }

    /// A `#` inside double quotes never starts a comment
    #[test]
    fn quoted_hash_is_kept(before in "[a-z ]{0,10}", inside in "[a-z#]{0,10}") {
        let line = format!("  post: {}\"{}\"", before, inside);
        prop_assert_eq!(strip_comment(&line), line.as_str());
    }

    /// Execution order is lead units, then untagged, then trail, each in
    /// document order; any repeated name is rejected
    #[test]
    fn execution_order_partitions_document(units in prop::collection::vec(unit_strategy(), 0..12)) {
        let doc = render(&units);
        let names: Vec<&str> = units.iter().map(|(n, _)| n.as_str()).collect();
        let unique: BTreeSet<&str> = names.iter().copied().collect();

        match parse_document(&doc) {
            Ok(registry) => {
                prop_assert_eq!(unique.len(), names.len());
                let expected: Vec<&str> = [Some(Bucket::Lead), None, Some(Bucket::Trail)]
                    .iter()
                    .flat_map(|b| units.iter().filter(move |(_, ub)| ub == b))
                    .map(|(n, _)| n.as_str())
                    .collect();
                let actual: Vec<&str> = registry
                    .execution_order()
                    .into_iter()
                    .map(|e| e.unit.name.as_str())
                    .collect();
                prop_assert_eq!(actual, expected);
            }
            Err(err) => {
                prop_assert!(unique.len() < names.len());
                prop_assert!(matches!(err, ParseError::DuplicateUnit { .. }), "{:?}", err);
            }
        }
    }
}

// =============================================================================
// Hostname Property Tests
// =============================================================================

fn host_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(\\.[a-z]{1,8}){0,3}"
}

proptest! {
    /// A matching exclusion rejects no matter what inclusions exist
    #[test]
    fn exclusion_always_wins(host in host_strategy(), others in prop::collection::vec(host_strategy(), 0..4)) {
        let mut patterns: BTreeSet<String> = others.into_iter().collect();
        patterns.insert(host.clone());
        patterns.insert(format!("!{}", host));
        prop_assert!(!host_matches(&patterns, &host));
    }

    /// Suffix patterns match exactly the hostnames ending in the suffix
    #[test]
    fn suffix_pattern_semantics(prefix in "[a-z]{1,8}", suffix in host_strategy()) {
        let patterns: BTreeSet<String> = [format!("*.{}", suffix)].into();
        let inside = format!("{}.{}", prefix, suffix);
        let outside = format!("{}.{}1", suffix, prefix);
        prop_assert!(host_matches(&patterns, &inside));
        prop_assert!(!host_matches(&patterns, &outside));
    }

    /// No patterns means every host
    #[test]
    fn empty_patterns_match(host in host_strategy()) {
        prop_assert!(host_matches(&BTreeSet::<String>::new(), &host));
    }
}
