use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rfqbrief_agent::{LlmClient, LlmSectionGenerator, PromptRenderer};
use rfqbrief_core::{BriefingInput, BriefingPipeline, Citation, FactCandidate, PipelineError, ReportTemplate, Stage};

/// Cites whatever markers the prompt offers, and optionally invents a price.
struct CitingClient {
    invent_price: bool,
}

#[async_trait]
impl LlmClient for CitingClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut lines = prompt
            .lines()
            .filter_map(|line| {
                let start = line.find("(cite as ")? + "(cite as ".len();
                let end = line[start..].find(')')? + start;
                Some(format!("Confirmed in source {}.", &line[start..end]))
            })
            .collect::<Vec<_>>();
        if self.invent_price {
            lines.push("Expect roughly $12 per piece.".to_string());
        }
        if lines.is_empty() {
            lines.push("Details are not yet confirmed.".to_string());
        }
        Ok(lines.join("\n"))
    }
}

fn pipeline(invent_price: bool) -> BriefingPipeline {
    let template = Arc::new(ReportTemplate::embedded().expect("embedded template"));
    let generator = LlmSectionGenerator::new(
        Arc::new(CitingClient { invent_price }),
        PromptRenderer::new().expect("prompt renderer"),
    );
    BriefingPipeline::new(template, Arc::new(generator))
}

fn input() -> BriefingInput {
    BriefingInput {
        rfq: None,
        rfq_fields: vec![
            FactCandidate::new("product", "Mounting bracket"),
            FactCandidate::new("qty", "800").numeric(),
            FactCandidate::new("material", "Stainless steel 304"),
            FactCandidate::new("standard", "EN 15085"),
            FactCandidate::new("target_date", "2026-05-15"),
        ],
        attachment_facts: vec![FactCandidate::new("tolerance", "±0.2 mm")
            .cited(Citation::new("drawing.pdf#p2"))
            .numeric()],
        web_facts: Vec::new(),
    }
}

#[tokio::test]
async fn model_citing_only_listed_facts_is_released() {
    let outcome = pipeline(false).run(&input()).await.expect("released");

    let quality = outcome.report.section("quality").expect("quality");
    assert!(quality.body.contains("[cite:drawing.pdf#p2]"));
    assert!(quality.orphan_citations.is_empty());
    assert!(quality.cited_facts.iter().any(|fact| fact.key == "tolerance"));
    assert!(outcome.rendered.starts_with("<summary>\n"));
}

#[tokio::test]
async fn model_inventing_an_unsourced_price_is_blocked() {
    let failure = pipeline(true).run(&input()).await.expect_err("blocked");

    assert_eq!(failure.stage, Stage::Validation);
    match failure.error {
        PipelineError::ValidationHardFailure { issues } => {
            assert!(issues.iter().any(|issue| issue.rule == "bare_usd_price"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
