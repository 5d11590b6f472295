//! Metric identity derivation
//!
//! Maps a metric name plus a set of label names to a stable token. The
//! token is what the registry keys its maps by, so it must be identical
//! across process restarts and independent of label ordering.

use std::collections::HashMap;
use std::fmt;

/// Prefix of every identity token
pub const IDENTITY_PREFIX: &str = "metric";

/// Separator placed between the name and each label name in the hash input.
///
/// ASCII unit separator: never valid in a Prometheus metric or label name,
/// so `("a b", [])` and `("a", ["b"])` cannot produce the same input.
const SEPARATOR: char = '\u{1f}';

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over a byte slice
const fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Deterministic identity of a (name, label-name set) pair
///
/// Formatted as `metric_<decimal hash>`. `help` and metric kind do not
/// participate, so a counter and a gauge with the same name and labels
/// share an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricIdentity(String);

impl MetricIdentity {
    /// Derive the identity from a name and label names in any order
    pub fn derive<S: AsRef<str>>(name: &str, label_names: &[S]) -> Self {
        let mut sorted: Vec<&str> = label_names.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();

        let mut input = String::with_capacity(
            name.len() + sorted.iter().map(|l| l.len() + 1).sum::<usize>(),
        );
        input.push_str(name);
        for label in sorted {
            input.push(SEPARATOR);
            input.push_str(label);
        }

        let hash = fnv1a_32(input.as_bytes());
        Self(format!("{}_{}", IDENTITY_PREFIX, hash))
    }

    /// Derive the identity from the key set of an update's label values
    pub fn from_label_values(name: &str, label_values: &HashMap<String, String>) -> Self {
        let keys: Vec<&str> = label_values.keys().map(String::as_str).collect();
        Self::derive(name, &keys)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fnv1a_known_vectors() {
        // Reference values for 32-bit FNV-1a
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_identity_format() {
        let id = MetricIdentity::derive("hits", &["env"]);
        let (prefix, digits) = id.as_str().split_once('_').expect("prefix separator");
        assert_eq!(prefix, IDENTITY_PREFIX);
        assert!(digits.parse::<u32>().is_ok(), "hash should be decimal u32: {}", id);
    }

    #[test]
    fn test_identity_is_stable_across_calls() {
        // No random seed: the same input must always hash the same way
        let a = MetricIdentity::derive("num_requests", &["container_name", "stage"]);
        let b = MetricIdentity::derive("num_requests", &["container_name", "stage"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_name_participates_in_identity() {
        let requests = MetricIdentity::derive("requests", &["region"]);
        let errors = MetricIdentity::derive("errors", &["region"]);
        assert_ne!(requests, errors);
    }

    #[test]
    fn test_label_set_participates_in_identity() {
        let a = MetricIdentity::derive("requests", &["region"]);
        let b = MetricIdentity::derive("requests", &["zone"]);
        let c = MetricIdentity::derive::<&str>("requests", &[]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_separator_prevents_boundary_ambiguity() {
        let a = MetricIdentity::derive("ab", &["c"]);
        let b = MetricIdentity::derive("a", &["bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_label_values_uses_key_set_only() {
        let mut prod = HashMap::new();
        prod.insert("env".to_string(), "prod".to_string());
        let mut dev = HashMap::new();
        dev.insert("env".to_string(), "dev".to_string());

        let declared = MetricIdentity::derive("hits", &["env"]);
        assert_eq!(MetricIdentity::from_label_values("hits", &prod), declared);
        assert_eq!(MetricIdentity::from_label_values("hits", &dev), declared);
    }

    proptest! {
        #[test]
        fn prop_identity_is_order_independent(
            name in "[a-z_]{1,16}",
            labels in proptest::collection::vec("[a-z_]{1,8}", 0..6),
            seed in any::<u64>(),
        ) {
            let mut shuffled = labels.clone();
            // Deterministic permutation driven by the generated seed
            let len = shuffled.len();
            if len > 1 {
                for i in 0..len {
                    let j = ((seed >> (i % 64)) as usize).wrapping_add(i * 7) % len;
                    shuffled.swap(i, j);
                }
            }
            prop_assert_eq!(
                MetricIdentity::derive(&name, &labels),
                MetricIdentity::derive(&name, &shuffled)
            );
        }

        #[test]
        fn prop_reversed_labels_same_identity(
            name in "[a-z_]{1,16}",
            labels in proptest::collection::vec("[a-z_]{1,8}", 0..6),
        ) {
            let mut reversed = labels.clone();
            reversed.reverse();
            prop_assert_eq!(
                MetricIdentity::derive(&name, &labels),
                MetricIdentity::derive(&name, &reversed)
            );
        }
    }
}
