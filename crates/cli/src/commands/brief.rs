use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rfqbrief_core::config::LoadOptions;
use rfqbrief_core::{BriefingInput, BriefingPipeline, FactSheetGenerator, PipelineError, PipelineFailure};
use serde_json::json;

use crate::commands::{load_config, load_template, CommandResult};

const COMMAND: &str = "brief";

/// Generation model served in-process. Other models need an `LlmClient`
/// wired in by the embedding service.
pub const FACT_SHEET_MODEL: &str = "fact-sheet";

#[derive(Debug, Clone)]
pub struct BriefArgs {
    pub input: PathBuf,
    pub template: Option<PathBuf>,
    pub audit: bool,
}

pub fn run(args: &BriefArgs, options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    if config.generation.model != FACT_SHEET_MODEL {
        return CommandResult::failure(
            COMMAND,
            "config_validation",
            format!(
                "generation model `{}` has no client in this binary (expected `{FACT_SHEET_MODEL}`)",
                config.generation.model
            ),
            2,
        );
    }

    let template = match load_template(COMMAND, &config, args.template.as_deref()) {
        Ok(template) => template,
        Err(result) => return result,
    };
    let input = match read_input(&args.input) {
        Ok(input) => input,
        Err(message) => return CommandResult::failure(COMMAND, "input_invalid", message, 2),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let pipeline = BriefingPipeline::new(Arc::new(template), Arc::new(FactSheetGenerator))
        .with_settings(config.assembly_settings());

    match runtime.block_on(pipeline.run(&input)) {
        Ok(outcome) => {
            let queries = outcome.report.queries().collect::<Vec<_>>();
            let message = format!(
                "briefing {} released: {} sections, {} open queries, {} redactions",
                outcome.run_id,
                outcome.report.sections.len(),
                queries.len(),
                outcome.redactions.len()
            );
            let data = json!({
                "run_id": outcome.run_id,
                "rendered": outcome.rendered,
                "queries": queries,
                "redactions": outcome.redactions,
                "warnings": outcome.validation.soft_issues(),
                "audit": args.audit.then_some(&outcome.audit),
            });
            CommandResult::success_with(COMMAND, message, Some(data))
        }
        Err(failure) => failure_result(&failure),
    }
}

fn read_input(path: &Path) -> Result<BriefingInput, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read input `{}`: {error}", path.display()))?;
    serde_json::from_str(&raw).map_err(|error| format!("could not parse input `{}`: {error}", path.display()))
}

fn failure_result(failure: &PipelineFailure) -> CommandResult {
    let (error_class, exit_code) = match &failure.error {
        PipelineError::Malformed(_) => ("input_invalid", 2),
        PipelineError::Generation(_) => ("generation_unavailable", 1),
        PipelineError::ValidationHardFailure { .. } => ("validation_blocked", 1),
    };
    let issues = match &failure.error {
        PipelineError::ValidationHardFailure { issues } => issues.clone(),
        _ => Vec::new(),
    };
    let data = json!({
        "run_id": failure.correlation_id,
        "stage": failure.stage,
        "retryable": failure.is_retryable(),
        "detail": failure.error.to_string(),
        "issues": issues,
    });
    CommandResult::failure_with(COMMAND, error_class, failure.user_message(), exit_code, Some(data))
}
