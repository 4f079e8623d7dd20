use std::path::Path;

use rfqbrief_core::config::LoadOptions;

use crate::commands::{load_config, load_template, CommandResult};

const COMMAND: &str = "template";

pub fn run(template: Option<&Path>, options: LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let template = match load_template(COMMAND, &config, template) {
        Ok(template) => template,
        Err(result) => return result,
    };

    let summary = template.describe();
    let message = format!(
        "template `{}` v{}: {}",
        summary.name,
        summary.version,
        template.section_names().join(", ")
    );
    match serde_json::to_value(&summary) {
        Ok(data) => CommandResult::success_with(COMMAND, message, Some(data)),
        Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 3),
    }
}
