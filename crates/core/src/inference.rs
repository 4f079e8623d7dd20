//! Inference tracking.
//!
//! Derives secondary facts from configured rules. Every derived fact is tagged
//! `INFERRED` with the filled explanation as its derivation, and a rule never
//! touches a key that already has a candidate. Conflicted triggers are not
//! used: picking one of two disagreeing sources would be a guess.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::fact::{Fact, FactValue};
use crate::domain::fact_set::FactSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceRule {
    pub derived_key: String,
    pub trigger_keys: Vec<String>,
    pub derivation: Derivation,
    /// `{{trigger_key}}` and `{{value}}` are substituted.
    pub explanation: String,
    /// Derived value is numeric and must pass the fabrication guard.
    #[serde(default)]
    pub numeric: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// Buckets the first trigger's quantity into prototype, batch or production.
    VolumeTier { prototype_below: Decimal, production_from: Decimal },
    /// First hint whose material (and geometry class, when set) matches.
    ProcessRoute { routes: Vec<RouteHint> },
    /// Phrase lookup on the first trigger's value.
    Lookup {
        table: BTreeMap<String, String>,
        #[serde(default)]
        fallback: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHint {
    pub material: String,
    #[serde(default)]
    pub geometry_class: Option<String>,
    pub route: String,
}

impl Derivation {
    fn derive(&self, triggers: &[&FactValue]) -> Option<String> {
        match self {
            Self::VolumeTier { prototype_below, production_from } => {
                let quantity = parse_quantity(&triggers.first()?.to_string())?;
                let tier = if quantity < *prototype_below {
                    "prototype"
                } else if quantity < *production_from {
                    "batch"
                } else {
                    "production"
                };
                Some(tier.to_string())
            }
            Self::ProcessRoute { routes } => {
                let material = triggers.first()?.normalized();
                let geometry = triggers.get(1).map(|value| value.normalized()).unwrap_or_default();
                routes
                    .iter()
                    .find(|hint| {
                        contains_phrase(&material, &hint.material.to_lowercase())
                            && hint.geometry_class.as_ref().map_or(true, |class| {
                                contains_phrase(&geometry, &class.to_lowercase())
                            })
                    })
                    .map(|hint| hint.route.clone())
            }
            Self::Lookup { table, fallback } => {
                let value = triggers.first()?.normalized();
                table
                    .iter()
                    .find(|(phrase, _)| contains_phrase(&value, &phrase.to_lowercase()))
                    .map(|(_, derived)| derived.clone())
                    .or_else(|| fallback.clone())
            }
        }
    }
}

/// Returns an augmented copy; the input set is left untouched.
pub fn infer(fact_set: &FactSet, rules: &[InferenceRule]) -> FactSet {
    let mut augmented = fact_set.clone();

    for rule in rules {
        if augmented.contains(&rule.derived_key) {
            debug!(
                event_name = "pipeline.inference.skipped",
                derived_key = %rule.derived_key,
                reason = "key already has candidates",
                "inference rule skipped"
            );
            continue;
        }

        if let Some(key) = rule.trigger_keys.iter().find(|key| augmented.is_conflicted(key)) {
            debug!(
                event_name = "pipeline.inference.skipped",
                derived_key = %rule.derived_key,
                trigger_key = %key,
                reason = "trigger conflicted",
                "inference rule skipped"
            );
            continue;
        }

        let Some(triggers) = rule
            .trigger_keys
            .iter()
            .map(|key| augmented.primary(key).filter(|_| augmented.is_resolved(key)))
            .collect::<Option<Vec<_>>>()
        else {
            debug!(
                event_name = "pipeline.inference.skipped",
                derived_key = %rule.derived_key,
                reason = "trigger unresolved",
                "inference rule skipped"
            );
            continue;
        };

        let values = triggers.iter().map(|fact| &fact.value).collect::<Vec<_>>();
        let Some(derived) = rule.derivation.derive(&values) else {
            continue;
        };

        let mut variables = BTreeMap::new();
        for (key, fact) in rule.trigger_keys.iter().zip(&triggers) {
            variables.insert(key.clone(), fact.value.to_string());
        }
        variables.insert("value".to_string(), derived.clone());
        let derivation = substitute_variables(&rule.explanation, &variables);

        debug!(
            event_name = "pipeline.inference.derived",
            derived_key = %rule.derived_key,
            value = %derived,
            "derived fact added"
        );
        augmented.insert(
            Fact::inferred(rule.derived_key.clone(), derived, derivation).with_numeric(rule.numeric),
        );
    }

    augmented
}

/// Fills `{{name}}` placeholders in one pass. Substituted values are never
/// rescanned; unknown placeholders are left as written.
fn substitute_variables(template: &str, variables: &BTreeMap<String, String>) -> String {
    static PLACEHOLDER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_][a-z0-9_]*)\s*\}\}").expect("valid regex"));

    PLACEHOLDER_RE
        .replace_all(template, |captures: &regex::Captures<'_>| match variables.get(&captures[1]) {
            Some(value) => value.clone(),
            None => captures[0].to_string(),
        })
        .into_owned()
}

/// First number in the text, thousands separators allowed: `"1,200 pcs"` is 1200.
pub fn parse_quantity(text: &str) -> Option<Decimal> {
    static NUMBER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"));

    let matched = NUMBER_RE.find(text)?;
    Decimal::from_str(&matched.as_str().replace(',', "")).ok()
}

fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let pad = |text: &str| {
        let words = text
            .chars()
            .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
            .collect::<String>();
        format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "))
    };
    let needle = pad(needle);
    !needle.trim().is_empty() && pad(haystack).contains(&needle)
}
