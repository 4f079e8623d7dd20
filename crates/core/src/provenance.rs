//! Provenance classification.
//!
//! Merges RFQ fields, attachment extractions and web findings into one
//! [`FactSet`]. Candidates are grouped by key and ordered by tier; stated
//! sources that disagree are all kept and the key is flagged `conflicted`.
//! Schema keys nobody supplied are recorded as unknown.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::domain::fact::{Citation, Fact, FactCandidate, SourceTier};
use crate::domain::fact_set::FactSet;
use crate::errors::{MalformedFactError, MalformedReason};

/// Citation prefix for facts taken from the RFQ intake record.
pub const RFQ_CITATION_PREFIX: &str = "rfq:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    RfqField,
    Attachment,
    Web,
}

#[derive(Clone, Debug, Default)]
pub struct ProvenanceClassifier {
    required_keys: BTreeSet<String>,
}

impl ProvenanceClassifier {
    pub fn new<I, K>(required_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self { required_keys: required_keys.into_iter().map(Into::into).collect() }
    }

    pub fn required_keys(&self) -> &BTreeSet<String> {
        &self.required_keys
    }

    pub fn classify(
        &self,
        rfq_fields: &[FactCandidate],
        attachment_facts: &[FactCandidate],
        web_facts: &[FactCandidate],
    ) -> Result<FactSet, MalformedFactError> {
        let mut fact_set = FactSet::new();

        let sources = [
            (Origin::RfqField, rfq_fields),
            (Origin::Attachment, attachment_facts),
            (Origin::Web, web_facts),
        ];
        for (origin, candidates) in sources {
            for candidate in candidates {
                let Some(fact) = to_fact(origin, candidate)? else {
                    continue;
                };
                if fact_set.candidates(&fact.key).contains(&fact) {
                    continue;
                }
                fact_set.insert(fact);
            }
        }

        let conflicted = fact_set
            .keys()
            .filter(|key| has_stated_disagreement(fact_set.candidates(key)))
            .map(str::to_string)
            .collect::<Vec<_>>();
        for key in conflicted {
            warn!(
                event_name = "pipeline.classification.conflict",
                key = %key,
                "stated sources disagree; alternates retained"
            );
            fact_set.mark_conflicted(key);
        }

        for key in &self.required_keys {
            fact_set.mark_unknown(key.clone());
        }

        debug!(
            event_name = "pipeline.classification.completed",
            facts = fact_set.len(),
            unknown = fact_set.unknown_keys().len(),
            conflicted = fact_set.conflicted_keys().len(),
            "fact set classified"
        );
        Ok(fact_set)
    }
}

fn to_fact(origin: Origin, candidate: &FactCandidate) -> Result<Option<Fact>, MalformedFactError> {
    let key = normalize_key(&candidate.key);
    let citation = candidate.citation.clone().filter(|citation| !citation.is_blank());

    let tier = match origin {
        Origin::RfqField | Origin::Attachment => SourceTier::Attachment,
        Origin::Web if citation.is_some() => SourceTier::Web,
        Origin::Web => SourceTier::Unknown,
    };

    if key.is_empty() {
        return Err(MalformedFactError {
            key: candidate.key.clone(),
            tier,
            reason: MalformedReason::EmptyKey,
        });
    }

    if candidate.value.is_empty() {
        debug!(
            event_name = "pipeline.classification.empty_value",
            key = %key,
            "candidate without value ignored"
        );
        return Ok(None);
    }

    let citation = match (origin, citation) {
        (_, Some(citation)) => Some(citation),
        (Origin::RfqField, None) => Some(Citation::new(format!("{RFQ_CITATION_PREFIX}{key}"))),
        (Origin::Attachment, None) => {
            let reason = if candidate.numeric {
                MalformedReason::UncitedNumeric
            } else {
                MalformedReason::MissingCitation
            };
            return Err(MalformedFactError { key, tier, reason });
        }
        (Origin::Web, None) => {
            debug!(
                event_name = "pipeline.classification.uncited_web",
                key = %key,
                "web candidate without source demoted to UNKNOWN tier"
            );
            None
        }
    };

    Ok(Some(
        Fact::stated(key, candidate.value.clone(), tier, citation).with_numeric(candidate.numeric),
    ))
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

fn has_stated_disagreement(candidates: &[Fact]) -> bool {
    let values = candidates
        .iter()
        .filter(|fact| fact.source_tier.requires_citation())
        .map(|fact| fact.value.normalized())
        .collect::<BTreeSet<_>>();
    values.len() > 1
}

#[cfg(test)]
mod tests {
    use crate::domain::fact::{Citation, Confidence, FactCandidate, SourceTier};
    use crate::errors::MalformedReason;

    use super::ProvenanceClassifier;

    fn classifier() -> ProvenanceClassifier {
        ProvenanceClassifier::new(["qty", "material", "standard"])
    }

    #[test]
    fn attachment_outranks_web_and_both_are_kept_when_they_disagree() {
        let attachments =
            [FactCandidate::new("material", "SS 316").cited(Citation::new("drawing.pdf#p2"))];
        let web =
            [FactCandidate::new("material", "SS 304").cited(Citation::new("https://example.com/a"))];

        let set = classifier().classify(&[], &attachments, &web).expect("classify");

        let candidates = set.candidates("material");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_tier, SourceTier::Attachment);
        assert_eq!(candidates[1].source_tier, SourceTier::Web);
        assert!(set.is_conflicted("material"));
    }

    #[test]
    fn agreeing_sources_are_not_conflicted() {
        let rfq = [FactCandidate::new("material", "SS304")];
        let attachments =
            [FactCandidate::new("material", "ss304 ").cited(Citation::new("boq.xlsx!Sheet1"))];

        let set = classifier().classify(&rfq, &attachments, &[]).expect("classify");
        assert_eq!(set.candidates("material").len(), 2);
        assert!(!set.is_conflicted("material"));
    }

    #[test]
    fn two_attachments_disagreeing_flag_conflict() {
        let attachments = [
            FactCandidate::new("qty", "500").cited(Citation::new("rfq.pdf#p1")).numeric(),
            FactCandidate::new("qty", "750").cited(Citation::new("boq.xlsx!Lines")).numeric(),
        ];
        let set = classifier().classify(&[], &attachments, &[]).expect("classify");
        assert!(set.is_conflicted("qty"));
        assert_eq!(set.alternates("qty").len(), 1);
    }

    #[test]
    fn rfq_fields_get_intake_citation() {
        let rfq = [FactCandidate::new("Standard", "CE")];
        let set = classifier().classify(&rfq, &[], &[]).expect("classify");

        let fact = set.primary("standard").expect("standard fact");
        assert_eq!(fact.citation_reference(), Some("rfq:standard"));
        assert_eq!(fact.confidence, Confidence::Stated);
    }

    #[test]
    fn required_keys_without_candidates_are_unknown() {
        let rfq = [FactCandidate::new("material", "Aluminium 6061")];
        let set = classifier().classify(&rfq, &[], &[]).expect("classify");

        assert!(set.is_unknown("qty"));
        assert!(set.is_unknown("standard"));
        assert!(!set.is_unknown("material"));
    }

    #[test]
    fn empty_key_is_malformed() {
        let rfq = [FactCandidate::new("  ", "x")];
        let error = classifier().classify(&rfq, &[], &[]).expect_err("empty key");
        assert_eq!(error.reason, MalformedReason::EmptyKey);
    }

    #[test]
    fn uncited_numeric_attachment_is_malformed() {
        let attachments = [FactCandidate::new("unit_price", "₹240/kg").numeric()];
        let error = classifier().classify(&[], &attachments, &[]).expect_err("uncited numeric");
        assert_eq!(error.reason, MalformedReason::UncitedNumeric);
        assert_eq!(error.tier, SourceTier::Attachment);
    }

    #[test]
    fn uncited_web_finding_is_demoted_to_unknown_tier() {
        let web = [FactCandidate::new("unit_price", "$4.20 per piece").numeric()];
        let set = classifier().classify(&[], &[], &web).expect("classify");

        let fact = set.primary("unit_price").expect("kept for the guard");
        assert_eq!(fact.source_tier, SourceTier::Unknown);
        assert!(!set.is_resolved("unit_price"));
    }

    #[test]
    fn classification_is_pure() {
        let rfq = [FactCandidate::new("qty", "1200").numeric()];
        let web = [FactCandidate::new("material", "EN8").cited(Citation::new("https://x.test"))];
        let first = classifier().classify(&rfq, &[], &web).expect("first");
        let second = classifier().classify(&rfq, &[], &web).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
    }
}
