//! Fabrication guard.
//!
//! Numeric facts survive only with a citation at ATTACHMENT/WEB tier, or as an
//! inferred order-of-magnitude statement. Compliance facts are reframed as
//! requirements unless a stated source quotes proof of conformity. Nothing is
//! deleted: offending values are replaced and a [`RedactionNotice`] recorded.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::fact::{Confidence, Fact, FactValue, SourceTier};
use crate::domain::fact_set::FactSet;

pub const BENCHMARK_PLACEHOLDER: &str = "UNKNOWN — requires benchmarking";
pub const CONFIRMATION_SUFFIX: &str = "required / to be confirmed";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionReason {
    /// Numeric value from an uncited or unknown source.
    UncitedNumeric,
    /// Inferred numeric value stated as a bare literal.
    InferredLiteral,
    /// Compliance claim without quoted proof of conformity.
    UnprovenCompliance,
}

impl RedactionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UncitedNumeric => "uncited_numeric",
            Self::InferredLiteral => "inferred_literal",
            Self::UnprovenCompliance => "unproven_compliance",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionNotice {
    pub key: String,
    pub original_value: String,
    pub replacement: String,
    pub source_tier: SourceTier,
    pub reason: RedactionReason,
}

#[derive(Clone, Debug, Default)]
pub struct FabricationGuard {
    compliance_keys: BTreeSet<String>,
}

impl FabricationGuard {
    pub fn new<I, K>(compliance_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self { compliance_keys: compliance_keys.into_iter().map(Into::into).collect() }
    }

    pub fn guard(&self, fact_set: &FactSet) -> (FactSet, Vec<RedactionNotice>) {
        let mut guarded = fact_set.clone();
        let mut notices = Vec::new();

        for fact in guarded.facts_mut() {
            let notice = if fact.numeric {
                redact_numeric(fact)
            } else {
                None
            };
            let notice = match notice {
                Some(notice) => Some(notice),
                None if self.compliance_keys.contains(&fact.key) => reframe_compliance(fact),
                None => None,
            };

            if let Some(notice) = notice {
                warn!(
                    event_name = "pipeline.guard.redacted",
                    key = %notice.key,
                    tier = %notice.source_tier,
                    reason = notice.reason.as_str(),
                    "fact rewritten by fabrication guard"
                );
                notices.push(notice);
            }
        }

        (guarded, notices)
    }
}

fn redact_numeric(fact: &mut Fact) -> Option<RedactionNotice> {
    let value = fact.value.to_string();
    if value == BENCHMARK_PLACEHOLDER {
        return None;
    }

    let reason = match fact.source_tier {
        SourceTier::Attachment | SourceTier::Web if fact.has_citation() => return None,
        SourceTier::Inferred if is_order_of_magnitude(&value) => return None,
        SourceTier::Inferred => RedactionReason::InferredLiteral,
        _ => RedactionReason::UncitedNumeric,
    };

    fact.value = FactValue::text(BENCHMARK_PLACEHOLDER);
    Some(RedactionNotice {
        key: fact.key.clone(),
        original_value: value,
        replacement: BENCHMARK_PLACEHOLDER.to_string(),
        source_tier: fact.source_tier,
        reason,
    })
}

fn reframe_compliance(fact: &mut Fact) -> Option<RedactionNotice> {
    let value = fact.value.to_string();
    if value.ends_with(CONFIRMATION_SUFFIX) || has_conformity_proof(fact) {
        return None;
    }

    let subject = strip_conformity_claim(&value);
    let subject = if subject.is_empty() { fact.key.replace('_', " ") } else { subject };
    let replacement = format!("{subject} {CONFIRMATION_SUFFIX}");

    fact.value = FactValue::text(replacement.clone());
    Some(RedactionNotice {
        key: fact.key.clone(),
        original_value: value,
        replacement,
        source_tier: fact.source_tier,
        reason: RedactionReason::UnprovenCompliance,
    })
}

/// A stated attachment or web fact whose cited excerpt asserts conformity.
pub(crate) fn has_conformity_proof(fact: &Fact) -> bool {
    fact.confidence == Confidence::Stated
        && matches!(fact.source_tier, SourceTier::Attachment | SourceTier::Web)
        && fact.has_citation()
        && fact
            .citation
            .as_ref()
            .and_then(|citation| citation.excerpt.as_deref())
            .is_some_and(asserts_conformity)
}

/// Whether quoted source text asserts conformity rather than a requirement.
pub fn asserts_conformity(text: &str) -> bool {
    static PROOF_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b(?:declaration of conformity|certificate|certified|compliant|conforms?|test report)\b",
        )
        .expect("valid regex")
    });
    PROOF_RE.is_match(text)
}

/// Whether a value reads as a range or qualitative bucket rather than a bare
/// literal. Purely qualitative text without digits passes.
pub fn is_order_of_magnitude(value: &str) -> bool {
    static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\d[\d,.]*\s*[a-z%/]*\s*(?:-|–|to)\s*[₹$€]?\s*\d").expect("valid regex")
    });
    static QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)~|≈|\b(?:approx(?:\.|imately)?|about|around|roughly|order of|range|between|band|typical(?:ly)?|estimated?|indicative|low|medium|mid|high|moderate)\b",
        )
        .expect("valid regex")
    });

    if RANGE_RE.is_match(value) || QUALIFIER_RE.is_match(value) {
        return true;
    }
    !value.chars().any(|ch| ch.is_ascii_digit())
}

fn strip_conformity_claim(value: &str) -> String {
    static CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b(?:fully\s+|is\s+|are\s+)?(?:compliant|compliance|conforming|conformity|conforms?|certified|certification|approved)\b(?:\s+(?:with|to))?",
        )
        .expect("valid regex")
    });

    let stripped = CLAIM_RE.replace_all(value, " ");
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|ch: char| ch == '-' || ch == ':' || ch == ',' || ch == '.' || ch.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use crate::domain::fact::{Citation, Fact, SourceTier};
    use crate::domain::fact_set::FactSet;

    use super::{
        is_order_of_magnitude, FabricationGuard, RedactionReason, BENCHMARK_PLACEHOLDER,
    };

    fn guard() -> FabricationGuard {
        FabricationGuard::new(["standard", "certification"])
    }

    fn single(fact: Fact) -> FactSet {
        let mut set = FactSet::new();
        set.insert(fact);
        set
    }

    #[test]
    fn cited_web_price_passes() {
        let set = single(
            Fact::stated(
                "unit_price",
                "$4.20 per piece",
                SourceTier::Web,
                Some(Citation::new("https://supplier.example/list")),
            )
            .with_numeric(true),
        );

        let (guarded, notices) = guard().guard(&set);
        assert!(notices.is_empty());
        assert_eq!(guarded, set);
    }

    #[test]
    fn uncited_price_is_redacted_with_notice() {
        let set =
            single(Fact::stated("unit_price", "$4.20 per piece", SourceTier::Unknown, None).with_numeric(true));

        let (guarded, notices) = guard().guard(&set);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].reason, RedactionReason::UncitedNumeric);
        assert_eq!(notices[0].original_value, "$4.20 per piece");
        assert_eq!(
            guarded.primary("unit_price").map(|fact| fact.value.to_string()).as_deref(),
            Some(BENCHMARK_PLACEHOLDER)
        );
    }

    #[test]
    fn inferred_numeric_passes_only_as_order_of_magnitude() {
        let banded = single(
            Fact::inferred("price_band", "₹180-260/kg range", "benchmark band").with_numeric(true),
        );
        assert!(guard().guard(&banded).1.is_empty());

        let literal =
            single(Fact::inferred("price_band", "₹240/kg", "guessed").with_numeric(true));
        let (_, notices) = guard().guard(&literal);
        assert_eq!(notices[0].reason, RedactionReason::InferredLiteral);
    }

    #[test]
    fn bare_standard_is_reframed_as_requirement() {
        let set = single(Fact::stated(
            "standard",
            "CE",
            SourceTier::Attachment,
            Some(Citation::new("rfq:standard")),
        ));

        let (guarded, notices) = guard().guard(&set);
        assert_eq!(
            guarded.primary("standard").map(|fact| fact.value.to_string()).as_deref(),
            Some("CE required / to be confirmed")
        );
        assert_eq!(notices[0].reason, RedactionReason::UnprovenCompliance);
    }

    #[test]
    fn compliant_claim_without_proof_is_downgraded() {
        let set = single(Fact::stated(
            "certification",
            "Fully compliant with EN 1090",
            SourceTier::Web,
            Some(Citation::new("https://vendor.example/about")),
        ));

        let (guarded, _) = guard().guard(&set);
        assert_eq!(
            guarded.primary("certification").map(|fact| fact.value.to_string()).as_deref(),
            Some("EN 1090 required / to be confirmed")
        );
    }

    #[test]
    fn quoted_proof_keeps_compliance_claim() {
        let set = single(Fact::stated(
            "standard",
            "CE compliant",
            SourceTier::Attachment,
            Some(
                Citation::new("doc.pdf#p7")
                    .with_excerpt("EU Declaration of Conformity No. 2291 issued for the assembly"),
            ),
        ));

        let (guarded, notices) = guard().guard(&set);
        assert!(notices.is_empty());
        assert_eq!(guarded, set);
    }

    #[test]
    fn guard_is_idempotent() {
        let mut set = FactSet::new();
        set.insert(Fact::stated("standard", "CE", SourceTier::Attachment, Some(Citation::new("rfq:standard"))));
        set.insert(Fact::stated("unit_price", "USD 3", SourceTier::Unknown, None).with_numeric(true));

        let (once, first_notices) = guard().guard(&set);
        let (twice, second_notices) = guard().guard(&once);
        assert_eq!(first_notices.len(), 2);
        assert!(second_notices.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn order_of_magnitude_detection() {
        assert!(is_order_of_magnitude("10-15%"));
        assert!(is_order_of_magnitude("approx. ₹300/kg"));
        assert!(is_order_of_magnitude("mid-range tooling cost"));
        assert!(!is_order_of_magnitude("$12"));
        assert!(!is_order_of_magnitude("18%"));
    }
}
