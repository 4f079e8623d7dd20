use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::domain::fact::{Fact, SourceTier};

/// Candidate facts per key, highest precedence first, plus the schema keys no
/// source resolved and the keys whose stated sources disagree.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FactSet {
    entries: BTreeMap<String, Vec<Fact>>,
    unknown: BTreeSet<String>,
    conflicted: BTreeSet<String>,
}

impl FactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts behind every candidate of equal or higher precedence, so
    /// arrival order is kept within a tier.
    pub(crate) fn insert(&mut self, fact: Fact) {
        self.unknown.remove(&fact.key);
        let candidates = self.entries.entry(fact.key.clone()).or_default();
        let position = candidates
            .iter()
            .position(|existing| existing.source_tier > fact.source_tier)
            .unwrap_or(candidates.len());
        candidates.insert(position, fact);
    }

    pub(crate) fn mark_unknown(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.unknown.insert(key);
        }
    }

    pub(crate) fn mark_conflicted(&mut self, key: impl Into<String>) {
        self.conflicted.insert(key.into());
    }

    pub(crate) fn facts_mut(&mut self) -> impl Iterator<Item = &mut Fact> {
        self.entries.values_mut().flat_map(|candidates| candidates.iter_mut())
    }

    pub fn candidates(&self, key: &str) -> &[Fact] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn primary(&self, key: &str) -> Option<&Fact> {
        self.candidates(key).first()
    }

    pub fn alternates(&self, key: &str) -> &[Fact] {
        self.candidates(key).get(1..).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// A key is resolved when its best candidate came from an actual source
    /// or a recorded inference.
    pub fn is_resolved(&self, key: &str) -> bool {
        self.primary(key).is_some_and(|fact| fact.source_tier != SourceTier::Unknown)
    }

    pub fn is_unknown(&self, key: &str) -> bool {
        self.unknown.contains(key)
    }

    pub fn is_conflicted(&self, key: &str) -> bool {
        self.conflicted.contains(key)
    }

    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown
    }

    pub fn conflicted_keys(&self) -> &BTreeSet<String> {
        &self.conflicted
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn facts(&self) -> impl Iterator<Item = &Fact> {
        self.entries.values().flat_map(|candidates| candidates.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Content digest over keys, candidates and flags in canonical order.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, candidates) in &self.entries {
            hasher.update(key.as_bytes());
            for fact in candidates {
                hasher.update(&[0x1f]);
                hasher.update(fact.value.to_string().as_bytes());
                hasher.update(fact.source_tier.label().as_bytes());
                hasher.update(fact.citation_reference().unwrap_or_default().as_bytes());
                hasher.update(fact.derivation.as_deref().unwrap_or_default().as_bytes());
                hasher.update(&[u8::from(fact.numeric)]);
            }
            hasher.update(&[0x1e]);
        }
        for key in &self.unknown {
            hasher.update(b"unknown:");
            hasher.update(key.as_bytes());
        }
        for key in &self.conflicted {
            hasher.update(b"conflicted:");
            hasher.update(key.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::fact::{Citation, Fact, SourceTier};

    use super::FactSet;

    #[test]
    fn insert_keeps_precedence_and_arrival_order() {
        let mut set = FactSet::new();
        set.insert(Fact::inferred("volume_tier", "batch", "from qty"));
        set.insert(Fact::stated("volume_tier", "a", SourceTier::Web, Some(Citation::new("u1"))));
        set.insert(Fact::stated(
            "volume_tier",
            "b",
            SourceTier::Attachment,
            Some(Citation::new("d.pdf#p1")),
        ));
        set.insert(Fact::stated("volume_tier", "c", SourceTier::Web, Some(Citation::new("u2"))));

        let tiers: Vec<_> =
            set.candidates("volume_tier").iter().map(|fact| fact.value.to_string()).collect();
        assert_eq!(tiers, vec!["b", "a", "c", "batch"]);
        assert_eq!(set.alternates("volume_tier").len(), 3);
    }

    #[test]
    fn inserting_a_fact_clears_unknown_flag() {
        let mut set = FactSet::new();
        set.mark_unknown("qty");
        assert!(set.is_unknown("qty"));

        set.insert(Fact::inferred("qty", "order of 100s", "from drawing notes"));
        assert!(!set.is_unknown("qty"));
        assert!(set.is_resolved("qty"));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let mut left = FactSet::new();
        left.insert(Fact::stated("material", "SS304", SourceTier::Attachment, Some(Citation::new("a#p1"))));
        let mut right = left.clone();
        assert_eq!(left.digest(), right.digest());

        right.mark_conflicted("material");
        assert_ne!(left.digest(), right.digest());
    }
}
