//! Tagged config value tree and the deep-merge that powers layered
//! configuration. Values deserialize straight from YAML; merge is pure and
//! override-wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single configuration value: scalar, sequence, or nested tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigValue>),
    Map(ConfigTree),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ConfigTree> {
        match self {
            Self::Map(tree) => Some(tree),
            _ => None,
        }
    }

    /// Human label for error messages ("sequence", "map", ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }
}

/// String-keyed mapping of config values. Key order is irrelevant for
/// lookups; BTreeMap keeps serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(BTreeMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deep-merge two trees, `overlay` winning over `base`.
///
/// For each key in `overlay`: if both sides hold a map, recurse; otherwise
/// the overlay value replaces the base value wholesale. Sequences always
/// replace - they are never concatenated or merged index-by-index. Keys only
/// in `base` are retained. Neither input is mutated.
pub fn merge(base: &ConfigTree, overlay: &ConfigTree) -> ConfigTree {
    let mut merged = base.clone();
    for (key, value) in overlay.iter() {
        let combined = match (merged.get(key), value) {
            (Some(ConfigValue::Map(base_sub)), ConfigValue::Map(over_sub)) => {
                ConfigValue::Map(merge(base_sub, over_sub))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(yaml: &str) -> ConfigTree {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_overlay_replaces_scalars() {
        let base = tree("image: \"22.04\"\ncpus: 2");
        let over = tree("cpus: 4");
        let merged = merge(&base, &over);
        assert_eq!(merged.get("cpus"), Some(&ConfigValue::Integer(4)));
        assert_eq!(
            merged.get("image").and_then(ConfigValue::as_str),
            Some("22.04")
        );
    }

    #[test]
    fn test_nested_maps_merge_recursively() {
        let base = tree("resources:\n  cpus: 2\n  memory: 2G");
        let over = tree("resources:\n  memory: 8G");
        let merged = merge(&base, &over);
        let resources = merged.get("resources").unwrap().as_map().unwrap();
        assert_eq!(resources.get("cpus"), Some(&ConfigValue::Integer(2)));
        assert_eq!(
            resources.get("memory").and_then(ConfigValue::as_str),
            Some("8G")
        );
    }

    #[test]
    fn test_sequences_replace_wholesale() {
        let base = tree("mounts:\n  - a\n  - b\n  - c");
        let over = tree("mounts:\n  - z");
        let merged = merge(&base, &over);
        let mounts = merged.get("mounts").unwrap().as_sequence().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].as_str(), Some("z"));
    }

    #[test]
    fn test_map_replaced_by_scalar() {
        let base = tree("network:\n  bridged: true");
        let over = tree("network: none");
        let merged = merge(&base, &over);
        assert_eq!(
            merged.get("network").and_then(ConfigValue::as_str),
            Some("none")
        );
    }

    #[test]
    fn test_inputs_not_mutated() {
        let base = tree("a: 1\nnested:\n  x: 1");
        let over = tree("a: 2\nnested:\n  x: 2");
        let base_before = base.clone();
        let over_before = over.clone();
        let _ = merge(&base, &over);
        assert_eq!(base, base_before);
        assert_eq!(over, over_before);
    }

    #[test]
    fn test_two_sequential_merges_apply_precedence_once() {
        // merge(merge(A, B), C) must behave as if A ≺ B ≺ C precedence were
        // applied in a single pass: C wins where set, then B, then A.
        let a = tree("k: a\nonly_a: 1\nshared_ab: a\nshared_ac: a");
        let b = tree("k: b\nshared_ab: b\nshared_bc: b");
        let c = tree("k: c\nshared_ac: c\nshared_bc: c");
        let merged = merge(&merge(&a, &b), &c);
        assert_eq!(merged.get("k").and_then(ConfigValue::as_str), Some("c"));
        assert_eq!(merged.get("only_a"), Some(&ConfigValue::Integer(1)));
        assert_eq!(
            merged.get("shared_ab").and_then(ConfigValue::as_str),
            Some("b")
        );
        assert_eq!(
            merged.get("shared_ac").and_then(ConfigValue::as_str),
            Some("c")
        );
        assert_eq!(
            merged.get("shared_bc").and_then(ConfigValue::as_str),
            Some("c")
        );
    }

    #[test]
    fn test_merge_with_empty_sides() {
        let base = tree("a: 1");
        let empty = ConfigTree::new();
        assert_eq!(merge(&base, &empty), base);
        assert_eq!(merge(&empty, &base), base);
    }

    #[test]
    fn test_yaml_roundtrip_preserves_shape() {
        let original = tree("name: worker-1\nresources:\n  cpus: 2\nmounts:\n  - source: /src\n    target: /dst");
        let text = serde_yaml::to_string(&original).unwrap();
        let reparsed: ConfigTree = serde_yaml::from_str(&text).unwrap();
        assert_eq!(original, reparsed);
    }
}
