use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use rfqbrief_core::{GenerationRequest, GenerationUnavailableError, SectionGenerator};
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompt::PromptRenderer;

/// [`SectionGenerator`] backed by a text-completion client.
#[derive(Clone)]
pub struct LlmSectionGenerator {
    client: Arc<dyn LlmClient>,
    prompts: PromptRenderer,
}

impl LlmSectionGenerator {
    pub fn new(client: Arc<dyn LlmClient>, prompts: PromptRenderer) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl SectionGenerator for LlmSectionGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationUnavailableError> {
        let section = request.contract.section.as_str();
        let prompt = self
            .prompts
            .render(request)
            .map_err(|error| unavailable(request, format!("{error:#}")))?;

        let completion = self.client.complete(&prompt).await.map_err(|error| {
            warn!(
                event_name = "agent.generation.failed",
                correlation_id = %request.run_id,
                section = %section,
                error = %error,
                "completion request failed"
            );
            unavailable(request, format!("completion failed: {error:#}"))
        })?;

        let body = sanitize_section_output(&completion);
        if body.is_empty() {
            return Err(unavailable(request, "completion contained no section text".to_string()));
        }

        debug!(
            event_name = "agent.generation.completed",
            correlation_id = %request.run_id,
            section = %section,
            prompt_chars = prompt.len(),
            body_chars = body.len(),
            "section text generated"
        );
        Ok(body)
    }
}

fn unavailable(request: &GenerationRequest, reason: String) -> GenerationUnavailableError {
    GenerationUnavailableError { section: request.contract.section.clone(), reason, timed_out: false }
}

/// Drops section marker lines and code fences the model emitted; the
/// assembler adds the markers itself.
pub fn sanitize_section_output(raw: &str) -> String {
    static MARKER_LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*</?[A-Za-z][A-Za-z0-9_]*\s*>\s*$").expect("valid regex"));

    raw.lines()
        .filter(|line| !MARKER_LINE_RE.is_match(line) && !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
