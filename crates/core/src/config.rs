use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::AssemblySettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub template: TemplateConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default)]
pub struct TemplateConfig {
    /// Report template file; the embedded template is used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub timeout_secs: u64,
    pub max_parallel_sections: usize,
    /// `fact-sheet` renders offline; any other name selects an LLM backend.
    pub model: String,
    /// Credentials and endpoint for an LLM backend. Not read by the core
    /// pipeline; the service that builds an `LlmClient` takes them from here.
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub template_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub generation_timeout_secs: Option<u64>,
    pub generation_max_parallel_sections: Option<usize>,
    pub generation_model: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            template: TemplateConfig::default(),
            generation: GenerationConfig {
                timeout_secs: 60,
                max_parallel_sections: 5,
                model: "fact-sheet".to_string(),
                api_key: None,
                base_url: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rfqbrief.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn assembly_settings(&self) -> AssemblySettings {
        AssemblySettings {
            max_parallel_sections: self.generation.max_parallel_sections,
            timeout: Duration::from_secs(self.generation.timeout_secs),
        }
    }

    /// Effective settings with secrets reduced to a presence flag.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "template": {
                "path": self.template.path.as_ref().map(|path| path.display().to_string()),
            },
            "generation": {
                "timeout_secs": self.generation.timeout_secs,
                "max_parallel_sections": self.generation.max_parallel_sections,
                "model": self.generation.model,
                "api_key_configured": self.generation.api_key.is_some(),
                "base_url": self.generation.base_url,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format.as_str(),
            },
        })
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(template) = patch.template {
            if let Some(path) = template.path {
                self.template.path = Some(path);
            }
        }

        if let Some(generation) = patch.generation {
            if let Some(timeout_secs) = generation.timeout_secs {
                self.generation.timeout_secs = timeout_secs;
            }
            if let Some(max_parallel_sections) = generation.max_parallel_sections {
                self.generation.max_parallel_sections = max_parallel_sections;
            }
            if let Some(model) = generation.model {
                self.generation.model = model;
            }
            if let Some(generation_api_key_value) = generation.api_key {
                self.generation.api_key = Some(secret_value(generation_api_key_value));
            }
            if let Some(base_url) = generation.base_url {
                self.generation.base_url = Some(base_url);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RFQBRIEF_TEMPLATE_PATH") {
            self.template.path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("RFQBRIEF_GENERATION_TIMEOUT_SECS") {
            self.generation.timeout_secs = parse_u64("RFQBRIEF_GENERATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RFQBRIEF_GENERATION_MAX_PARALLEL_SECTIONS") {
            self.generation.max_parallel_sections =
                parse_usize("RFQBRIEF_GENERATION_MAX_PARALLEL_SECTIONS", &value)?;
        }
        if let Some(value) = read_env("RFQBRIEF_GENERATION_MODEL") {
            self.generation.model = value;
        }
        if let Some(value) = read_env("RFQBRIEF_GENERATION_API_KEY") {
            self.generation.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RFQBRIEF_GENERATION_BASE_URL") {
            self.generation.base_url = Some(value);
        }

        let log_level =
            read_env("RFQBRIEF_LOGGING_LEVEL").or_else(|| read_env("RFQBRIEF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RFQBRIEF_LOGGING_FORMAT").or_else(|| read_env("RFQBRIEF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(template_path) = overrides.template_path {
            self.template.path = Some(template_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(timeout_secs) = overrides.generation_timeout_secs {
            self.generation.timeout_secs = timeout_secs;
        }
        if let Some(max_parallel_sections) = overrides.generation_max_parallel_sections {
            self.generation.max_parallel_sections = max_parallel_sections;
        }
        if let Some(model) = overrides.generation_model {
            self.generation.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_template(&self.template)?;
        validate_generation(&self.generation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rfqbrief.toml"), PathBuf::from("config/rfqbrief.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_template(template: &TemplateConfig) -> Result<(), ConfigError> {
    if let Some(path) = &template.path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "template.path must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_generation(generation: &GenerationConfig) -> Result<(), ConfigError> {
    if generation.timeout_secs == 0 || generation.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "generation.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if generation.max_parallel_sections == 0 {
        return Err(ConfigError::Validation(
            "generation.max_parallel_sections must be greater than zero".to_string(),
        ));
    }

    if generation.model.trim().is_empty() {
        return Err(ConfigError::Validation("generation.model must not be empty".to_string()));
    }

    let blank_key =
        generation.api_key.as_ref().is_some_and(|value| value.expose_secret().trim().is_empty());
    if blank_key {
        return Err(ConfigError::Validation(
            "generation.api_key is set but empty; remove it or provide a key".to_string(),
        ));
    }

    if let Some(base_url) = &generation.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "generation.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    template: Option<TemplatePatch>,
    generation: Option<GenerationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TemplatePatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    timeout_secs: Option<u64>,
    max_parallel_sections: Option<usize>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_use_embedded_template() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.template.path.is_none(), "default template path should be unset")?;
        ensure(config.generation.timeout_secs == 60, "default timeout should be 60s")?;
        ensure(
            config.assembly_settings().timeout == Duration::from_secs(60),
            "assembly settings should mirror generation timeout",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RFQBRIEF_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfqbrief.toml");
            fs::write(
                &path,
                r#"
[generation]
api_key = "${TEST_RFQBRIEF_API_KEY}"
model = "briefing-large"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.generation.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )?;
            ensure(config.generation.model == "briefing-large", "model should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_RFQBRIEF_API_KEY"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("rfqbrief.toml");
        fs::write(&path, "[generation]\napi_key = \"${RFQBRIEF_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "RFQBRIEF_TEST_UNSET_VAR"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFQBRIEF_LOG_LEVEL", "warn");
        env::set_var("RFQBRIEF_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["RFQBRIEF_LOG_LEVEL", "RFQBRIEF_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFQBRIEF_GENERATION_TIMEOUT_SECS", "45");
        env::set_var("RFQBRIEF_TEMPLATE_PATH", "from-env.toml");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("rfqbrief.toml");
            fs::write(
                &path,
                r#"
[template]
path = "from-file.toml"

[generation]
timeout_secs = 20
max_parallel_sections = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    template_path: Some(PathBuf::from("from-override.toml")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.template.path == Some(PathBuf::from("from-override.toml")),
                "override template path should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.generation.timeout_secs == 45, "env timeout should win over file")?;
            ensure(
                config.generation.max_parallel_sections == 3,
                "file parallelism should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["RFQBRIEF_GENERATION_TIMEOUT_SECS", "RFQBRIEF_TEMPLATE_PATH"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFQBRIEF_GENERATION_MAX_PARALLEL_SECTIONS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("generation.max_parallel_sections")
            );
            ensure(has_message, "validation failure should mention generation.max_parallel_sections")
        })();

        clear_vars(&["RFQBRIEF_GENERATION_MAX_PARALLEL_SECTIONS"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFQBRIEF_GENERATION_TIMEOUT_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "RFQBRIEF_GENERATION_TIMEOUT_SECS"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["RFQBRIEF_GENERATION_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug_or_summary() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RFQBRIEF_GENERATION_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            let summary = config.redacted_summary().to_string();

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(!summary.contains("sk-secret-value"), "summary should not contain api key")?;
            ensure(
                config.redacted_summary()["generation"]["api_key_configured"] == true,
                "summary should flag that a key is configured",
            )?;
            Ok(())
        })();

        clear_vars(&["RFQBRIEF_GENERATION_API_KEY"]);
        result
    }

    #[test]
    fn explicit_missing_file_is_an_error_when_required() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let error = match AppConfig::load(LoadOptions {
            config_path: Some(missing),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file error".to_string()),
            Err(error) => error,
        };
        ensure(matches!(error, ConfigError::MissingConfigFile(_)), "missing file should be reported")
    }
}
