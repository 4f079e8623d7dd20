//! Report assembly.
//!
//! Each [`SectionPlan`] becomes one call to the external [`SectionGenerator`]
//! carrying only that plan's facts and the section's content contract. Calls
//! run concurrently up to a permit limit and each is bounded by a timeout; a
//! failed or timed-out section never aborts its siblings.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::fact::{Fact, SourceTier};
use crate::domain::report::{Report, Section};
use crate::errors::{AssemblyError, GenerationUnavailableError};
use crate::planner::SectionPlan;

/// Marker syntax generated text uses to cite a fact.
pub const CITATION_FORMAT: &str = "[cite:<reference>]";

/// What the generator must honour for one section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentContract {
    pub section: String,
    pub title: String,
    pub subtopics: Vec<String>,
    pub banned_content: Vec<String>,
    pub max_length: usize,
    pub citation_required: bool,
    pub citation_format: String,
}

/// Closed input for one generation call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub run_id: String,
    pub contract: ContentContract,
    pub facts: Vec<Fact>,
}

impl GenerationRequest {
    pub fn from_plan(plan: &SectionPlan, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            contract: ContentContract {
                section: plan.spec.name.clone(),
                title: plan.spec.title.clone(),
                subtopics: plan.subtopics.clone(),
                banned_content: plan
                    .spec
                    .banned_content_rules
                    .iter()
                    .map(|rule| rule.description.clone())
                    .filter(|description| !description.is_empty())
                    .collect(),
                max_length: plan.spec.max_length,
                citation_required: true,
                citation_format: CITATION_FORMAT.to_string(),
            },
            facts: plan.facts.clone(),
        }
    }
}

/// The external text-generation capability. Returns the narrative body of
/// one section, without section markers.
#[async_trait]
pub trait SectionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationUnavailableError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssemblySettings {
    pub max_parallel_sections: usize,
    pub timeout: Duration,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self { max_parallel_sections: 5, timeout: Duration::from_secs(60) }
    }
}

#[derive(Clone)]
pub struct ReportAssembler {
    generator: Arc<dyn SectionGenerator>,
    settings: AssemblySettings,
}

impl ReportAssembler {
    pub fn new(generator: Arc<dyn SectionGenerator>, settings: AssemblySettings) -> Self {
        Self { generator, settings }
    }

    pub async fn assemble(&self, plans: &[SectionPlan], run_id: &str) -> Result<Report, AssemblyError> {
        let permits = Arc::new(Semaphore::new(self.settings.max_parallel_sections.max(1)));
        let mut tasks = JoinSet::new();

        for (index, plan) in plans.iter().enumerate() {
            let generator = Arc::clone(&self.generator);
            let permits = Arc::clone(&permits);
            let request = GenerationRequest::from_plan(plan, run_id);
            let timeout = self.settings.timeout;

            tasks.spawn(async move {
                let section = request.contract.section.clone();
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(timeout, generator.generate(&request)).await {
                        Ok(result) => result,
                        Err(_) => Err(GenerationUnavailableError {
                            section,
                            reason: format!("timed out after {}s", timeout.as_secs()),
                            timed_out: true,
                        }),
                    },
                    Err(error) => Err(GenerationUnavailableError {
                        section,
                        reason: format!("generation permits closed: {error}"),
                        timed_out: false,
                    }),
                };
                (index, result)
            });
        }

        let mut bodies = vec![None; plans.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => bodies[index] = Some(result),
                Err(error) => warn!(
                    event_name = "pipeline.assembly.task_aborted",
                    correlation_id = %run_id,
                    error = %error,
                    "generation task aborted"
                ),
            }
        }

        let mut seen_queries = HashSet::new();
        let mut sections = Vec::with_capacity(plans.len());
        let mut failures = Vec::new();

        for (plan, body) in plans.iter().zip(bodies) {
            let body = match body {
                Some(Ok(body)) => body,
                Some(Err(failure)) => {
                    warn!(
                        event_name = "pipeline.assembly.section_failed",
                        correlation_id = %run_id,
                        section = %failure.section,
                        timed_out = failure.timed_out,
                        reason = %failure.reason,
                        "section generation unavailable"
                    );
                    failures.push(failure);
                    continue;
                }
                None => {
                    failures.push(GenerationUnavailableError {
                        section: plan.name().to_string(),
                        reason: "generation task aborted".to_string(),
                        timed_out: false,
                    });
                    continue;
                }
            };

            let queries = plan
                .queries
                .iter()
                .filter(|query| seen_queries.insert(query.normalized_text()))
                .cloned()
                .collect();
            let (cited_facts, orphan_citations) = resolve_citations(plan, &body);
            if !orphan_citations.is_empty() {
                warn!(
                    event_name = "pipeline.assembly.orphan_citations",
                    correlation_id = %run_id,
                    section = %plan.name(),
                    orphans = orphan_citations.len(),
                    "generated text cites facts outside the section plan"
                );
            }

            debug!(
                event_name = "pipeline.assembly.section_completed",
                correlation_id = %run_id,
                section = %plan.name(),
                cited = cited_facts.len(),
                "section assembled"
            );
            sections.push(Section {
                name: plan.name().to_string(),
                body: body.trim().to_string(),
                cited_facts,
                orphan_citations,
                queries,
            });
        }

        let report = Report { sections };
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(AssemblyError { completed: report, failures })
        }
    }
}

/// Citation references in order of first appearance.
pub fn citation_markers(text: &str) -> Vec<String> {
    static CITE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[cite:\s*([^\]]+?)\s*\]").expect("valid regex"));

    let mut references = Vec::new();
    for capture in CITE_RE.captures_iter(text) {
        let reference = capture[1].to_string();
        if !references.contains(&reference) {
            references.push(reference);
        }
    }
    references
}

fn resolve_citations(plan: &SectionPlan, body: &str) -> (Vec<Fact>, Vec<String>) {
    let mut cited = Vec::new();
    let mut orphans = Vec::new();
    for reference in citation_markers(body) {
        let mut resolved = false;
        for fact in plan.facts_for_citation(&reference) {
            resolved = true;
            if !cited.contains(fact) {
                cited.push(fact.clone());
            }
        }
        if !resolved {
            orphans.push(reference);
        }
    }
    (cited, orphans)
}

/// Renders a section strictly from its plan, one line per fact. Used for
/// offline briefs and as the reference generator in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FactSheetGenerator;

#[async_trait]
impl SectionGenerator for FactSheetGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationUnavailableError> {
        Ok(render_fact_sheet(request))
    }
}

pub fn render_fact_sheet(request: &GenerationRequest) -> String {
    let mut lines = vec![request.contract.title.clone()];
    if request.facts.is_empty() {
        lines.push("No confirmed information is available for this section.".to_string());
        return lines.join("\n");
    }

    let mut seen_keys = HashSet::new();
    for fact in &request.facts {
        let label = label_for(&fact.key);
        let value = single_line(&fact.value.to_string());
        let first = seen_keys.insert(fact.key.as_str());
        let line = match (fact.source_tier, fact.citation_reference()) {
            (SourceTier::Attachment | SourceTier::Web, Some(reference)) if first => {
                format!("- {label}: {value} [cite:{reference}]")
            }
            (SourceTier::Attachment | SourceTier::Web, Some(reference)) => {
                format!("- {label} (conflicting source): {value} [cite:{reference}]")
            }
            (SourceTier::Inferred, _) => match fact.derivation.as_deref() {
                Some(derivation) => format!("- {label} (inferred): {value}. Basis: {}", single_line(derivation)),
                None => format!("- {label} (inferred): {value}"),
            },
            _ => format!("- {label} (unverified): {value}"),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Each fact stays on one line with its citation marker.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn label_for(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
