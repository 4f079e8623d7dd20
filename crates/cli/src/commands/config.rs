use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rfqbrief_core::config::LoadOptions;
use serde_json::{json, Map, Value as JsonValue};
use toml::Value;

use crate::commands::{load_config, CommandResult};

const COMMAND: &str = "config";

/// Config fields with the environment variables that can set them.
const FIELDS: &[(&str, &[&str])] = &[
    ("template.path", &["RFQBRIEF_TEMPLATE_PATH"]),
    ("generation.timeout_secs", &["RFQBRIEF_GENERATION_TIMEOUT_SECS"]),
    ("generation.max_parallel_sections", &["RFQBRIEF_GENERATION_MAX_PARALLEL_SECTIONS"]),
    ("generation.model", &["RFQBRIEF_GENERATION_MODEL"]),
    ("generation.api_key", &["RFQBRIEF_GENERATION_API_KEY"]),
    ("generation.base_url", &["RFQBRIEF_GENERATION_BASE_URL"]),
    ("logging.level", &["RFQBRIEF_LOGGING_LEVEL", "RFQBRIEF_LOG_LEVEL"]),
    ("logging.format", &["RFQBRIEF_LOGGING_FORMAT", "RFQBRIEF_LOG_FORMAT"]),
];

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let sources = FIELDS
        .iter()
        .map(|(key_path, env_keys)| {
            let source =
                field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
            (key_path.to_string(), JsonValue::String(source))
        })
        .collect::<Map<_, _>>();

    let data = json!({
        "effective": config.redacted_summary(),
        "sources": sources,
    });
    CommandResult::success_with(
        COMMAND,
        "effective config (source precedence: env > file > default)",
        Some(data),
    )
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("rfqbrief.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/rfqbrief.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
