//! Property-based tests for relman-core.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated inputs.
//!
//! # Properties Tested
//!
//! - Property 1: Artifact names round trip through render and parse
//! - Property 2: Malformed commits are dropped, never fatal
//! - Property 3: Catalog order and truncation
//! - Property 4: Promotion never writes when the live version is not older
//! - Property 5: Environments and channels never share manifest keys

#![cfg(test)]

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::catalog::{ReleaseCatalog, ReleaseSelector};
use crate::channel::Channel;
use crate::config::ReleaseConfig;
use crate::promotion::{Promoter, PromotionOutcome};
use crate::storage::MemoryStore;
use crate::version;

// =============================================================================
// Generators
// =============================================================================

/// Generate a `major.minor.patch` string.
fn arb_version() -> impl Strategy<Value = String> {
    (0u64..100, 0u64..100, 0u64..100)
        .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
}

/// Generate a whole-second UTC timestamp between 2001 and 2099.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (1_000_000_000i64..4_000_000_000i64)
        .prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

/// Generate a 7-character lowercase hex commit.
fn arb_commit() -> impl Strategy<Value = String> {
    "[0-9a-f]{7}"
}

/// Generate an alphanumeric build component of any length other than 7.
fn arb_bad_commit() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z][a-z0-9]{0,5}", "[a-z][a-z0-9]{7,12}"]
}

/// Generate an artifact name prefix.
fn arb_prefix() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{1,8}"
}

fn arb_extension() -> impl Strategy<Value = String> {
    prop_oneof![Just("dmg"), Just("zip"), Just("exe"), Just("7z"), Just("")].prop_map(String::from)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Manifest JSON naming a version.
fn manifest_json(version: &str) -> String {
    serde_json::json!({ "version": version, "name": format!("v{version}") }).to_string()
}

// =============================================================================
// Property 1: Round trip
//
// *For any* version, timestamp and commit, parsing a rendered name SHALL
// recover all three.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_render_parse_roundtrip(
        prefix in arb_prefix(),
        version in arb_version(),
        at in arb_timestamp(),
        commit in arb_commit(),
        ext in arb_extension(),
    ) {
        let name = version::render(&prefix, &version, at, Some(&commit), &ext);
        let parsed = version::parse(&name).unwrap();
        prop_assert_eq!(parsed.version, version);
        prop_assert_eq!(parsed.published_at, at);
        prop_assert_eq!(parsed.commit, Some(commit));
    }
}

// =============================================================================
// Property 2: Commit length
//
// *For any* build component whose length is not 7, the commit SHALL be
// absent and parsing SHALL still succeed.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_bad_commit_is_dropped(
        version in arb_version(),
        at in arb_timestamp(),
        commit in arb_bad_commit(),
    ) {
        let name = version::render("App", &version, at, Some(&commit), "zip");
        let parsed = version::parse(&name).unwrap();
        prop_assert_eq!(parsed.version, version);
        prop_assert!(parsed.commit.is_none());
    }
}

// =============================================================================
// Property 3: Catalog order
//
// *For any* set of artifacts and limit, the catalog SHALL be sorted newest
// first and hold min(limit, total) entries.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_catalog_sorted_and_truncated(
        entries in prop::collection::vec((arb_version(), arb_timestamp(), arb_commit()), 0..20),
        limit in 0usize..25,
    ) {
        let keys: Vec<String> = entries
            .iter()
            .map(|(v, at, c)| format!("darwin/{}", version::render("App", v, *at, Some(c), "dmg")))
            .collect();

        let catalog = ReleaseCatalog::load(&keys, "darwin/", ".dmg", limit);
        let expected = if limit == 0 { keys.len() } else { limit.min(keys.len()) };
        prop_assert_eq!(catalog.len(), expected);

        for pair in catalog.releases().windows(2) {
            prop_assert!(pair[0].date >= pair[1].date);
        }

        // The kept entries are the most recent ones
        if let Some(oldest_kept) = catalog.releases().last() {
            let cutoff = oldest_kept.date.with_timezone(&Utc);
            let newer_than_kept = entries.iter().filter(|(_, at, _)| *at > cutoff).count();
            prop_assert!(newer_than_kept < catalog.len());
        }
    }
}

// =============================================================================
// Property 4: No regressions
//
// *For any* live version at or above the candidate, with or without build
// suffixes, promotion SHALL write nothing; with nothing live it SHALL write
// exactly once.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_promotion_never_regresses(
        candidate in (0u64..20, 0u64..20, 0u64..20),
        bump in (0u64..3, 0u64..3, 0u64..3),
        at in arb_timestamp(),
        commit in arb_commit(),
        full_build in any::<bool>(),
    ) {
        let candidate_version = format!("{}.{}.{}", candidate.0, candidate.1, candidate.2);
        let mut live_version = format!(
            "{}.{}.{}",
            candidate.0 + bump.0,
            candidate.1 + bump.1,
            candidate.2 + bump.2
        );
        // Manifests written by update-json hold the whole build version
        if full_build {
            live_version = format!(
                "{live_version}-{}+{commit}",
                at.format(version::TIMESTAMP_FORMAT)
            );
        }

        let name = version::render("App", &candidate_version, at, Some(&commit), "dmg");
        let store = MemoryStore::with_objects([
            (format!("darwin/{name}"), "bits".to_string()),
            (
                format!("darwin-support/update-darwin-prod-{candidate_version}.json"),
                manifest_json(&candidate_version),
            ),
            ("update-darwin-prod.json".to_string(), manifest_json(&live_version)),
        ]);
        let config = ReleaseConfig::default();
        let darwin = config.platform("darwin").unwrap();

        let outcome = Promoter::new(&store, &config)
            .promote(darwin, &Channel::Public, &ReleaseSelector::latest())
            .unwrap();
        prop_assert!(!outcome.is_write());
        prop_assert_eq!(store.writes(), 0);
    }

    #[test]
    fn prop_first_publish_writes_once(
        v in arb_version(),
        at in arb_timestamp(),
        commit in arb_commit(),
    ) {
        let name = version::render("App", &v, at, Some(&commit), "dmg");
        let store = MemoryStore::with_objects([
            (format!("darwin/{name}"), "bits".to_string()),
            (format!("darwin-support/update-darwin-prod-{v}.json"), manifest_json(&v)),
        ]);
        let config = ReleaseConfig::default();
        let darwin = config.platform("darwin").unwrap();

        let outcome = Promoter::new(&store, &config)
            .promote(darwin, &Channel::Public, &ReleaseSelector::latest())
            .unwrap();
        prop_assert!(
            matches!(outcome, PromotionOutcome::Promoted { .. }),
            "Expected a promotion, got {:?}",
            outcome
        );
        prop_assert_eq!(store.copies(), 1);
        prop_assert_eq!(store.object("update-darwin-prod.json").unwrap(), manifest_json(&v).into_bytes());
    }
}

// =============================================================================
// Property 5: Key isolation
//
// *For any* two distinct (environment, channel) pairs, manifest keys SHALL
// differ.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_manifest_keys_isolated(
        env_a in "[a-z]{2,6}",
        env_b in "[a-z]{2,6}",
        channel_a in prop::option::of("[a-z]{2,6}"),
        channel_b in prop::option::of("[a-z]{2,6}"),
    ) {
        let channel_a = channel_a.map(Channel::named).unwrap_or_default();
        let channel_b = channel_b.map(Channel::named).unwrap_or_default();
        prop_assume!(env_a != env_b || channel_a != channel_b);

        prop_assert_ne!(
            channel_a.manifest_key("darwin", &env_a),
            channel_b.manifest_key("darwin", &env_b)
        );
    }
}
