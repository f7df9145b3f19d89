//! Property-based tests for relman-cli
//!
//! These tests verify correctness properties using proptest.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use relman_core::{version, PlatformOutcome, PromotionOutcome, Release};

    use crate::config::{CliOverrides, Config};
    use crate::github::{clean_upload_url, latest_version_tag, tag_for_version, version_of_tag, Tag};
    use crate::output::{OutputFormat, OutputFormatter};

    /// Strategy to generate valid output formats
    fn output_format_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("table".to_string()),
            Just("json".to_string()),
            Just("quiet".to_string()),
        ]
    }

    /// Strategy to generate valid log levels
    fn log_level_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("error".to_string()),
            Just("warn".to_string()),
            Just("info".to_string()),
            Just("debug".to_string()),
            Just("trace".to_string()),
        ]
    }

    fn environment_strategy() -> impl Strategy<Value = String> {
        "[a-z]{2,10}"
    }

    fn version_strategy() -> impl Strategy<Value = (u64, u64, u64)> {
        (0u64..50, 0u64..50, 0u64..50)
    }

    /// Strategy to generate releases, some with unparseable names
    fn release_strategy() -> impl Strategy<Value = Release> {
        prop_oneof![
            (
                version_strategy(),
                1_000_000_000i64..4_000_000_000i64,
                "[0-9a-f]{7}"
            )
                .prop_map(|((major, minor, patch), secs, commit)| {
                    let at = Utc.timestamp_opt(secs, 0).unwrap();
                    let name = version::render(
                        "App",
                        &format!("{major}.{minor}.{patch}"),
                        at,
                        Some(&commit),
                        "dmg",
                    );
                    Release::from_key(&format!("darwin/{name}"), "darwin/")
                }),
            "[A-Za-z_]{1,12}\\.dmg"
                .prop_map(|name| Release::from_key(&format!("darwin/{name}"), "darwin/")),
        ]
    }

    fn outcome_strategy() -> impl Strategy<Value = PromotionOutcome> {
        prop_oneof![
            Just(PromotionOutcome::NotFound),
            Just(PromotionOutcome::Unsupported),
            (release_strategy(), any::<bool>()).prop_map(|(release, dry_run)| {
                PromotionOutcome::Promoted {
                    release,
                    source: "darwin-support/update-darwin-prod-1.0.0.json".to_string(),
                    destination: "update-darwin-prod.json".to_string(),
                    dry_run,
                }
            }),
            release_strategy().prop_map(|release| PromotionOutcome::Unchanged {
                release,
                current: "1.0.0".to_string(),
            }),
        ]
    }

    // **Property 1: Configuration Override Precedence**
    //
    // For any configuration option, command-line arguments SHALL override
    // config file values, and absent overrides SHALL leave them untouched.

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: CLI output_format override takes precedence over config file value
        #[test]
        fn test_config_override_output_format(
            config_format in output_format_strategy(),
            cli_format in output_format_strategy()
        ) {
            let mut config = Config::default();
            config.output.format = config_format;

            let overrides = CliOverrides {
                output_format: Some(cli_format.clone()),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(result.output.format, cli_format);
        }

        /// Property: CLI environment override takes precedence over config file value
        #[test]
        fn test_config_override_environment(
            config_env in environment_strategy(),
            cli_env in environment_strategy()
        ) {
            let mut config = Config::default();
            config.release.environment = config_env;

            let overrides = CliOverrides {
                environment: Some(cli_env.clone()),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(&result.release.environment, &cli_env);
            prop_assert!(result.validate().is_ok());
        }

        /// Property: CLI bucket override replaces the configured root
        #[test]
        fn test_config_override_bucket(
            config_root in prop::option::of("/[a-z]{1,8}"),
            cli_root in "/[a-z]{1,8}/[a-z]{1,8}"
        ) {
            let mut config = Config::default();
            config.storage.root = config_root.map(PathBuf::from);

            let overrides = CliOverrides {
                bucket: Some(PathBuf::from(&cli_root)),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(result.storage.root, Some(PathBuf::from(cli_root)));
        }

        /// Property: When CLI override is None, config file value is preserved
        #[test]
        fn test_config_preserves_values_when_no_override(
            format in output_format_strategy(),
            level in log_level_strategy(),
            env in environment_strategy(),
            verbose in any::<bool>()
        ) {
            let mut config = Config::default();
            config.output.format = format.clone();
            config.output.verbose = verbose;
            config.logging.level = level.clone();
            config.release.environment = env.clone();

            let result = config.with_overrides(&CliOverrides::default());

            prop_assert_eq!(result.output.format, format);
            prop_assert_eq!(result.output.verbose, verbose);
            prop_assert_eq!(result.logging.level, level);
            prop_assert_eq!(result.release.environment, env);
        }

        /// Property: debug override always forces the debug log level
        #[test]
        fn test_config_override_debug_sets_log_level(level in log_level_strategy()) {
            let mut config = Config::default();
            config.logging.level = level;

            let overrides = CliOverrides {
                debug: Some(true),
                ..Default::default()
            };
            let result = config.with_overrides(&overrides);

            prop_assert_eq!(result.logging.level, "debug");
        }
    }

    // **Property 2: Output Format Consistency**
    //
    // For any command with --output json, the output SHALL be valid JSON in
    // the JsonResponse schema; quiet mode SHALL print nothing.

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: output format names parse case-insensitively and display back
        #[test]
        fn test_output_format_roundtrip(format in output_format_strategy(), upper in any::<bool>()) {
            let input = if upper { format.to_uppercase() } else { format.clone() };
            let parsed = OutputFormat::from_str(&input).unwrap();
            prop_assert_eq!(parsed.to_string(), format);
        }

        /// Property: JSON output for release listings is always valid JSON
        #[test]
        fn test_json_output_releases_is_valid_json(
            releases in prop::collection::vec(release_strategy(), 0..10)
        ) {
            let formatter = OutputFormatter::new(OutputFormat::Json, false);
            let rows: Vec<(String, Release)> = releases
                .into_iter()
                .map(|r| ("darwin".to_string(), r))
                .collect();
            let output = formatter.format_releases(&rows);

            let json: serde_json::Value = serde_json::from_str(&output).unwrap();
            prop_assert_eq!(&json["success"], &serde_json::json!(true));
            prop_assert_eq!(&json["command"], &serde_json::json!("list"));
            prop_assert_eq!(&json["data"]["count"], &serde_json::json!(rows.len()));

            let ts = json["timestamp"].as_str().unwrap();
            prop_assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

            for (entry, (_, release)) in json["data"]["releases"].as_array().unwrap().iter().zip(&rows) {
                prop_assert_eq!(entry["version"].is_null(), !release.has_metadata());
            }
        }

        /// Property: JSON output for promotion outcomes carries every platform
        #[test]
        fn test_json_output_outcomes_is_valid_json(
            outcomes in prop::collection::vec(outcome_strategy(), 0..6)
        ) {
            let formatter = OutputFormatter::new(OutputFormat::Json, false);
            let outcomes: Vec<PlatformOutcome> = outcomes
                .into_iter()
                .enumerate()
                .map(|(i, outcome)| PlatformOutcome { platform: format!("p{i}"), outcome })
                .collect();
            let output = formatter.format_outcomes(&outcomes, "promote-releases");

            let json: serde_json::Value = serde_json::from_str(&output).unwrap();
            let data = json["data"].as_array().unwrap();
            prop_assert_eq!(data.len(), outcomes.len());
            for (entry, o) in data.iter().zip(&outcomes) {
                prop_assert_eq!(entry["outcome"].as_str().unwrap(), o.outcome.label());
                prop_assert_eq!(entry["platform"].as_str().unwrap(), o.platform.as_str());
            }
        }

        /// Property: Quiet mode produces empty output for all data types
        #[test]
        fn test_quiet_mode_produces_empty_output(
            releases in prop::collection::vec(release_strategy(), 0..5),
            outcomes in prop::collection::vec(outcome_strategy(), 0..5)
        ) {
            let formatter = OutputFormatter::new(OutputFormat::Quiet, false);
            let rows: Vec<(String, Release)> = releases
                .into_iter()
                .map(|r| ("darwin".to_string(), r))
                .collect();
            let outcomes: Vec<PlatformOutcome> = outcomes
                .into_iter()
                .map(|outcome| PlatformOutcome { platform: "darwin".to_string(), outcome })
                .collect();

            prop_assert!(formatter.format_releases(&rows).is_empty());
            prop_assert!(formatter.format_outcomes(&outcomes, "promote-release").is_empty());
            prop_assert!(formatter.format_report(&[]).is_empty());
            prop_assert!(formatter.format_broken(&[]).is_empty());
        }
    }

    // **Property 3: GitHub release helpers**
    //
    // For any set of version tags, the latest tag SHALL carry the highest
    // version regardless of listing order, and tag names SHALL round trip.

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_latest_version_tag_is_maximum(
            versions in prop::collection::vec(version_strategy(), 1..12),
            noise in prop::collection::vec("[a-z]{3,8}", 0..4)
        ) {
            let mut tags: Vec<Tag> = versions
                .iter()
                .map(|(a, b, c)| Tag { name: tag_for_version(&format!("{a}.{b}.{c}")) })
                .collect();
            tags.extend(noise.into_iter().map(|name| Tag { name }));

            let expected = versions.iter().max().unwrap();
            let latest = latest_version_tag(&tags).unwrap().name.clone();
            prop_assert_eq!(
                &latest,
                &format!("v{}.{}.{}", expected.0, expected.1, expected.2)
            );

            tags.reverse();
            prop_assert_eq!(&latest_version_tag(&tags).unwrap().name, &latest);
        }

        #[test]
        fn test_tag_roundtrip((a, b, c) in version_strategy()) {
            let v = format!("{a}.{b}.{c}");
            let tag = tag_for_version(&v);
            prop_assert_eq!(version_of_tag(&tag), Some(v.as_str()));
        }

        #[test]
        fn test_clean_upload_url_strips_template(
            base in "https://uploads\\.example\\.com/repos/[a-z]{1,8}/[a-z]{1,8}/releases/[0-9]{1,6}/assets",
            template in prop_oneof![Just(""), Just("{?name,label}"), Just("{?name}")]
        ) {
            let url = format!("{base}{template}");
            prop_assert_eq!(clean_upload_url(&url), base.as_str());
        }
    }
}
