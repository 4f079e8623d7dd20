use serde::{Deserialize, Serialize};

use crate::domain::fact::Fact;
use crate::domain::query::Query;

/// Version of the marker contract downstream parsers split on. Bump on any
/// change to marker syntax or section order semantics.
pub const OUTPUT_CONTRACT_VERSION: &str = "rfq-brief/1";

pub fn open_marker(section: &str) -> String {
    format!("<{section}>")
}

pub fn close_marker(section: &str) -> String {
    format!("</{section}>")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub body: String,
    /// Facts the body actually cites, for audit.
    pub cited_facts: Vec<Fact>,
    /// Citation markers that did not resolve to a fact in the section plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphan_citations: Vec<String>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl Section {
    /// Narrative followed by the section's open-question block.
    pub fn rendered_body(&self) -> String {
        let mut output = self.body.trim().to_string();
        if !self.queries.is_empty() {
            if !output.is_empty() {
                output.push_str("\n\n");
            }
            output.push_str("Open questions:");
            for query in &self.queries {
                output.push_str(&format!("\n- {}", query.text));
                if !query.impact.is_empty() {
                    output.push_str(&format!(" (impact: {})", query.impact));
                }
            }
        }
        output
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub sections: Vec<Section>,
}

impl Report {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.sections.iter().flat_map(|section| section.queries.iter())
    }

    /// Renders the marker-delimited document. Nothing is emitted outside the
    /// section markers.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|section| {
                format!(
                    "{}\n{}\n{}",
                    open_marker(&section.name),
                    section.rendered_body(),
                    close_marker(&section.name)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
