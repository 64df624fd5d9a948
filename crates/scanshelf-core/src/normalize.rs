//! Name normalization state: the variant → canonical map and the set of
//! pairs the user confirmed are different merchants.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::NameError;

/// Flat many-to-one map from variant spellings to a canonical name.
///
/// No canonical value is ever also a key, so resolution is one lookup and
/// the map cannot contain cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizationMap {
    entries: BTreeMap<String, String>,
}

impl NormalizationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form of `name` (itself when unmapped).
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, variant: &str) -> Option<&str> {
        self.entries.get(variant).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct canonical names, sorted.
    pub fn canonical_names(&self) -> BTreeSet<String> {
        self.entries.values().cloned().collect()
    }

    /// Canonical form of `name` followed by every variant that resolves to it.
    pub fn class_of<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let canonical = self.resolve(name);
        let mut class = vec![canonical];
        class.extend(
            self.entries
                .iter()
                .filter(|(_, c)| c.as_str() == canonical)
                .map(|(variant, _)| variant.as_str()),
        );
        class
    }

    /// Map every variant onto the canonical form of `target`.
    ///
    /// Returns the canonical name and the variant spellings that now point to
    /// it (excluding the canonical itself). Entries that previously pointed at
    /// one of those variants are collapsed onto the canonical.
    pub fn merge(
        &mut self,
        target: &str,
        variants: &[String],
    ) -> Result<(String, Vec<String>), NameError> {
        if target.is_empty() {
            return Err(NameError::EmptyTarget);
        }
        let canonical = self.resolve(target).to_string();

        let mut rewritten: Vec<String> = Vec::new();
        for name in std::iter::once(target).chain(variants.iter().map(String::as_str)) {
            if name != canonical && !rewritten.iter().any(|r| r == name) {
                rewritten.push(name.to_string());
            }
        }

        self.entries.remove(&canonical);
        for variant in &rewritten {
            self.entries.insert(variant.clone(), canonical.clone());
        }
        for value in self.entries.values_mut() {
            if rewritten.contains(value) {
                *value = canonical.clone();
            }
        }
        Ok((canonical, rewritten))
    }
}

/// Unordered pairs of names confirmed to be different merchants.
///
/// Serialized as a sorted list of `[a, b]` with `a < b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinctPairSet {
    pairs: BTreeSet<(String, String)>,
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl DistinctPairSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns false if it was already present or `a == b`.
    pub fn insert(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        self.pairs.insert(ordered(a, b))
    }

    pub fn remove(&mut self, a: &str, b: &str) -> bool {
        self.pairs.remove(&ordered(a, b))
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        a != b && self.pairs.contains(&ordered(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// First confirmed-distinct pair among `names`, if any.
    pub fn conflict<'a>(&self, names: &[&'a str]) -> Option<(&'a str, &'a str)> {
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                if self.contains(a, b) {
                    return Some((*a, *b));
                }
            }
        }
        None
    }
}

impl DistinctPairSet {
    /// True when any spelling in the class of `a` is confirmed distinct from
    /// any spelling in the class of `b`.
    pub fn separates(&self, map: &NormalizationMap, a: &str, b: &str) -> bool {
        let right = map.class_of(b);
        map.class_of(a)
            .iter()
            .any(|x| right.iter().any(|y| self.contains(x, y)))
    }
}

impl Serialize for DistinctPairSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let list: Vec<[&str; 2]> = self.iter().map(|(a, b)| [a, b]).collect();
        list.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DistinctPairSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list: Vec<[String; 2]> = Vec::deserialize(deserializer)?;
        let mut set = DistinctPairSet::new();
        for [a, b] in list {
            set.insert(&a, &b);
        }
        Ok(set)
    }
}
