//! Prompt rendering for one section generation call.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use rfqbrief_core::{Fact, GenerationRequest};
use serde::Serialize;
use tera::{Context, Tera};

const SECTION_PROMPT: &str = "section_prompt.txt";
const SECTION_PROMPT_SOURCE: &str = include_str!("../templates/section_prompt.txt");

/// Fact as the prompt lists it: value flattened to text, tier as its label.
#[derive(Clone, Debug, Serialize)]
struct PromptFact {
    key: String,
    value: String,
    tier: &'static str,
    citation: Option<String>,
    derivation: Option<String>,
}

impl From<&Fact> for PromptFact {
    fn from(fact: &Fact) -> Self {
        Self {
            key: fact.key.clone(),
            value: fact.value.to_string(),
            tier: fact.source_tier.label(),
            citation: fact.citation_reference().map(str::to_string),
            derivation: fact.derivation.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        Self::with_template(SECTION_PROMPT_SOURCE)
    }

    /// Renderer for a custom prompt. The template sees `contract` and `facts`.
    pub fn with_template(source: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(SECTION_PROMPT, source).context("section prompt template is invalid")?;
        tera.register_filter("label", label_filter);
        Ok(Self { tera })
    }

    pub fn render(&self, request: &GenerationRequest) -> Result<String> {
        let facts = request.facts.iter().map(PromptFact::from).collect::<Vec<_>>();

        let mut context = Context::new();
        context.insert("contract", &request.contract);
        context.insert("facts", &facts);
        context.insert("run_id", &request.run_id);

        self.tera
            .render(SECTION_PROMPT, &context)
            .with_context(|| format!("failed to render prompt for section `{}`", request.contract.section))
    }
}

/// `snake_case` key to a readable label: `unit_price | label` gives `Unit price`.
fn label_filter(value: &tera::Value, _args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    let key = value.as_str().ok_or_else(|| tera::Error::msg("label filter expects a string input"))?;
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    let label = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(tera::Value::String(label))
}
