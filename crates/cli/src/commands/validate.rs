use std::fs;
use std::path::Path;

use rfqbrief_core::config::LoadOptions;
use rfqbrief_core::validate_document;
use serde_json::json;

use crate::commands::{load_config, load_template, CommandResult};

const COMMAND: &str = "validate";

pub fn run(document: &Path, template: Option<&Path>, options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let template = match load_template(COMMAND, &config, template) {
        Ok(template) => template,
        Err(result) => return result,
    };
    let text = match fs::read_to_string(document) {
        Ok(text) => text,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "input_invalid",
                format!("could not read document `{}`: {error}", document.display()),
                2,
            );
        }
    };

    let result = validate_document(&text, &template);
    let hard = result.hard_issues();
    let data = json!({
        "template": template.name,
        "template_version": template.version,
        "releasable": result.is_releasable(),
        "issues": result.issues,
    });

    if hard.is_empty() {
        let message = format!(
            "document satisfies `{}` v{} ({} warnings)",
            template.name,
            template.version,
            result.soft_issues().len()
        );
        CommandResult::success_with(COMMAND, message, Some(data))
    } else {
        let rules = hard.iter().map(|issue| issue.rule.as_str()).collect::<Vec<_>>().join(", ");
        CommandResult::failure_with(
            COMMAND,
            "validation_blocked",
            format!("document blocked by {} hard issue(s): {rules}", hard.len()),
            1,
            Some(data),
        )
    }
}
