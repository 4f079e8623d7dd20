//! Section planning: maps the guarded fact set onto the template's sections.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::fact::Fact;
use crate::domain::fact_set::FactSet;
use crate::domain::query::Query;
use crate::domain::section::{SectionSpec, SubtopicMapping};
use crate::template::ReportTemplate;

/// Facts, subtopics and open questions assigned to one output section.
#[derive(Clone, Debug, Serialize)]
pub struct SectionPlan {
    #[serde(serialize_with = "serialize_spec_name")]
    pub spec: Arc<SectionSpec>,
    pub subtopics: Vec<String>,
    /// Every candidate for the section's keys, alternates included.
    pub facts: Vec<Fact>,
    pub queries: Vec<Query>,
}

impl SectionPlan {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Every fact a `[cite:<reference>]` marker points at in this plan. One
    /// source page often backs several keys.
    pub fn facts_for_citation<'a>(&'a self, reference: &'a str) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts.iter().filter(move |fact| fact.citation_reference() == Some(reference))
    }
}

fn serialize_spec_name<S>(spec: &Arc<SectionSpec>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&spec.name)
}

/// One plan per template section, in template order.
pub fn plan(fact_set: &FactSet, template: &ReportTemplate) -> Vec<SectionPlan> {
    template.sections().iter().map(|spec| plan_section(fact_set, template, spec)).collect()
}

fn plan_section(fact_set: &FactSet, template: &ReportTemplate, spec: &Arc<SectionSpec>) -> SectionPlan {
    let mut subtopics = Vec::new();
    let mut keys = Vec::<&str>::new();
    let mut queries = Vec::new();

    for tag in &spec.required_subtopics {
        let Some(mapping) = template.subtopic(tag) else {
            continue;
        };
        subtopics.push(tag.clone());
        push_keys(&mut keys, mapping);

        if !mapping.blocking || mapping.keys.iter().any(|key| fact_set.is_resolved(key)) {
            continue;
        }
        let unknown = mapping.keys.iter().find(|key| fact_set.is_unknown(key));
        if let Some(key) = unknown.or_else(|| mapping.keys.first()) {
            queries.push(Query {
                text: mapping.question_for(key),
                impact: mapping.impact.clone(),
                target_section: spec.name.clone(),
                key: Some(key.clone()),
                blocking: true,
            });
        }
    }

    for tag in &spec.optional_subtopics {
        let Some(mapping) = template.subtopic(tag) else {
            continue;
        };
        if mapping.keys.iter().any(|key| fact_set.is_resolved(key)) {
            subtopics.push(tag.clone());
            push_keys(&mut keys, mapping);
        }
    }

    let facts = keys
        .iter()
        .flat_map(|key| fact_set.candidates(key).iter().cloned())
        .collect::<Vec<_>>();

    for key in keys.iter().filter(|key| fact_set.is_conflicted(key)) {
        queries.push(conflict_query(fact_set, template, spec, key));
    }

    debug!(
        event_name = "pipeline.planning.section_planned",
        section = %spec.name,
        subtopics = subtopics.len(),
        facts = facts.len(),
        queries = queries.len(),
        "section planned"
    );

    SectionPlan { spec: Arc::clone(spec), subtopics, facts, queries }
}

fn push_keys<'a>(keys: &mut Vec<&'a str>, mapping: &'a SubtopicMapping) {
    for key in &mapping.keys {
        if !keys.contains(&key.as_str()) {
            keys.push(key);
        }
    }
}

fn conflict_query(fact_set: &FactSet, template: &ReportTemplate, spec: &SectionSpec, key: &str) -> Query {
    let values = fact_set
        .candidates(key)
        .iter()
        .filter(|fact| fact.source_tier.requires_citation())
        .map(|fact| match fact.citation_reference() {
            Some(reference) => format!("\"{}\" ({reference})", fact.value),
            None => format!("\"{}\"", fact.value),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(" vs ");

    let mapping = spec
        .subtopics()
        .filter_map(|tag| template.subtopic(tag))
        .find(|mapping| mapping.keys.iter().any(|mapped| mapped == key));

    Query {
        text: format!("Sources disagree on {}: {values}. Which value applies?", key.replace('_', " ")),
        impact: mapping
            .map(|mapping| mapping.impact.clone())
            .filter(|impact| !impact.is_empty())
            .unwrap_or_else(|| "Conflicting source values cannot be quoted as fact.".to_string()),
        target_section: spec.name.clone(),
        key: Some(key.to_string()),
        blocking: mapping.is_some_and(|mapping| mapping.blocking),
    }
}
