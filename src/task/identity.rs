// src/task/identity.rs

//! Node identity derivation.
//!
//! The identity doubles as the output collection name, so it must be stable
//! across runs and distinct for every distinct significant parameter set.

use crate::task::params::Params;

/// Number of significant values rendered in the readable part of the id.
const SUMMARY_VALUES: usize = 3;
/// Maximum characters kept from each rendered value.
const SUMMARY_VALUE_LEN: usize = 16;
/// Hex characters kept from the parameter hash.
const HASH_LEN: usize = 10;

/// Identity of a node of `family` with the given resolved parameters.
///
/// - no significant parameters: the family name itself;
/// - otherwise `Family_<summary>_<hash>` where `summary` is built from the
///   first few significant values (sorted by parameter name) and `hash` is a
///   blake3 digest prefix of the canonical JSON rendering of all of them.
pub fn node_identity(family: &str, params: &Params) -> String {
    let significant = params.significant();
    if significant.is_empty() {
        return family.to_string();
    }

    let summary = significant
        .values()
        .take(SUMMARY_VALUES)
        .map(|value| sanitize(&value.to_string()))
        .collect::<Vec<_>>()
        .join("_");

    // BTreeMap keys serialize in order and nested dicts are BTreeMaps too,
    // which makes this rendering canonical.
    let canonical = serde_json::to_string(&significant).unwrap_or_default();
    let digest = blake3::hash(canonical.as_bytes()).to_hex();

    format!("{family}_{summary}_{}", &digest.as_str()[..HASH_LEN])
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .take(SUMMARY_VALUE_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::params::{ParamSchema, ParamSpec};

    fn params(threshold: f64, channel: &str) -> Params {
        let schema = ParamSchema::new()
            .param(ParamSpec::float("threshold", 0.5))
            .param(ParamSpec::string("channel", "rgb"))
            .param(ParamSpec::bool("verbose", false).insignificant());
        let mut section = toml::Table::new();
        section.insert("threshold".into(), toml::Value::Float(threshold));
        section.insert("channel".into(), toml::Value::String(channel.into()));
        schema.resolve("Segment", Some(&section)).unwrap()
    }

    #[test]
    fn family_only_without_significant_params() {
        let params = ParamSchema::new()
            .param(ParamSpec::bool("verbose", false).insignificant())
            .resolve("Noop", None)
            .unwrap();
        assert_eq!(node_identity("Noop", &params), "Noop");
    }

    #[test]
    fn readable_prefix_and_hash_suffix() {
        let id = node_identity("Segment", &params(0.5, "rgb"));
        assert!(id.starts_with("Segment_rgb_0_5_"), "{id}");
        assert_eq!(id.len(), "Segment_rgb_0_5_".len() + HASH_LEN);
    }

    #[test]
    fn insignificant_params_do_not_change_identity() {
        let schema = ParamSchema::new()
            .param(ParamSpec::string("channel", "rgb"))
            .param(ParamSpec::bool("verbose", false).insignificant());
        let mut loud = toml::Table::new();
        loud.insert("verbose".into(), toml::Value::Boolean(true));
        let a = schema.resolve("T", None).unwrap();
        let b = schema.resolve("T", Some(&loud)).unwrap();
        assert_eq!(node_identity("T", &a), node_identity("T", &b));
    }

    #[test]
    fn long_values_are_truncated_and_sanitized() {
        assert_eq!(sanitize("a/b c-d"), "a_b_c_d");
        assert_eq!(sanitize("abcdefghijklmnopqrstuvwxyz").len(), SUMMARY_VALUE_LEN);
    }
}
