//! Report template: section specs, the key-to-subtopic table, inference rules
//! and banned patterns, loaded from TOML and shared read-only behind `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::report::OUTPUT_CONTRACT_VERSION;
use crate::domain::section::{BannedContentRule, SectionSpec, Severity, SubtopicMapping};
use crate::inference::InferenceRule;

pub const EMBEDDED_TEMPLATE: &str = include_str!("../templates/rfq_briefing.toml");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("could not read template file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse template: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("banned pattern `{id}` does not compile: {source}")]
    InvalidPattern { id: String, source: regex::Error },
    #[error("template validation failed: {0}")]
    Validation(String),
    #[error("template `{name}` version {proposed} must differ from active version {active}")]
    VersionNotBumped { name: String, active: u32, proposed: u32 },
}

#[derive(Clone, Debug)]
pub struct ReportTemplate {
    pub name: String,
    pub version: u32,
    sections: Vec<Arc<SectionSpec>>,
    subtopics: BTreeMap<String, SubtopicMapping>,
    inference_rules: Vec<InferenceRule>,
    compliance_keys: BTreeSet<String>,
}

impl ReportTemplate {
    /// The built-in `rfq_briefing` template.
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::from_toml_str(EMBEDDED_TEMPLATE)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| TemplateError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TemplateError> {
        let file = toml::from_str::<TemplateFile>(raw)?;
        file.build()
    }

    /// Sections in contract order.
    pub fn sections(&self) -> &[Arc<SectionSpec>] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Arc<SectionSpec>> {
        self.sections.iter().find(|spec| spec.name == name)
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|spec| spec.name.as_str()).collect()
    }

    pub fn subtopic(&self, tag: &str) -> Option<&SubtopicMapping> {
        self.subtopics.get(tag)
    }

    pub fn inference_rules(&self) -> &[InferenceRule] {
        &self.inference_rules
    }

    pub fn compliance_keys(&self) -> &BTreeSet<String> {
        &self.compliance_keys
    }

    /// Keys the schema asks for: every key mapped to a required subtopic of
    /// some section. Missing ones are recorded as unknown.
    pub fn required_keys(&self) -> BTreeSet<String> {
        self.sections
            .iter()
            .flat_map(|spec| spec.required_subtopics.iter())
            .filter_map(|tag| self.subtopics.get(tag))
            .flat_map(|mapping| mapping.keys.iter().cloned())
            .collect()
    }

    pub fn describe(&self) -> TemplateSummary {
        TemplateSummary {
            name: self.name.clone(),
            version: self.version,
            contract_version: OUTPUT_CONTRACT_VERSION.to_string(),
            sections: self
                .sections
                .iter()
                .map(|spec| SectionSummary {
                    name: spec.name.clone(),
                    title: spec.title.clone(),
                    required_subtopics: spec.required_subtopics.clone(),
                    optional_subtopics: spec.optional_subtopics.clone(),
                    banned_rules: spec.banned_content_rules.iter().map(|rule| rule.id.clone()).collect(),
                    max_length: spec.max_length,
                })
                .collect(),
            inference_rules: self.inference_rules.iter().map(|rule| rule.derived_key.clone()).collect(),
            compliance_keys: self.compliance_keys.iter().cloned().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub version: u32,
    pub contract_version: String,
    pub sections: Vec<SectionSummary>,
    pub inference_rules: Vec<String>,
    pub compliance_keys: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub title: String,
    pub required_subtopics: Vec<String>,
    pub optional_subtopics: Vec<String>,
    pub banned_rules: Vec<String>,
    pub max_length: usize,
}

/// Holds the active template. Runs take a snapshot with [`current`] and keep
/// it for their whole lifetime; [`replace`] swaps the pointer for new runs.
///
/// [`current`]: TemplateRegistry::current
/// [`replace`]: TemplateRegistry::replace
#[derive(Debug)]
pub struct TemplateRegistry {
    active: RwLock<Arc<ReportTemplate>>,
}

impl TemplateRegistry {
    pub fn new(template: ReportTemplate) -> Self {
        Self { active: RwLock::new(Arc::new(template)) }
    }

    pub fn current(&self) -> Arc<ReportTemplate> {
        match self.active.read() {
            Ok(active) => Arc::clone(&active),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Atomically installs `template`. The version must differ from the
    /// active one so audit exports stay unambiguous.
    pub fn replace(&self, template: ReportTemplate) -> Result<Arc<ReportTemplate>, TemplateError> {
        let mut active = match self.active.write() {
            Ok(active) => active,
            Err(poisoned) => poisoned.into_inner(),
        };
        if active.version == template.version {
            return Err(TemplateError::VersionNotBumped {
                name: template.name,
                active: active.version,
                proposed: template.version,
            });
        }

        info!(
            event_name = "template.replaced",
            name = %template.name,
            from_version = active.version,
            to_version = template.version,
            "report template swapped"
        );
        let previous = std::mem::replace(&mut *active, Arc::new(template));
        Ok(previous)
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    name: String,
    version: u32,
    #[serde(default)]
    compliance_keys: Vec<String>,
    #[serde(default)]
    subtopics: Vec<SubtopicMapping>,
    #[serde(default)]
    banned_patterns: Vec<BannedPatternFile>,
    #[serde(default)]
    sections: Vec<SectionFile>,
    #[serde(default)]
    inference_rules: Vec<InferenceRule>,
}

#[derive(Debug, Deserialize)]
struct SectionFile {
    name: String,
    title: String,
    #[serde(default)]
    required_subtopics: Vec<String>,
    #[serde(default)]
    optional_subtopics: Vec<String>,
    #[serde(default)]
    banned_patterns: Vec<BannedPatternFile>,
    max_length: usize,
}

#[derive(Clone, Debug, Deserialize)]
struct BannedPatternFile {
    id: String,
    #[serde(default)]
    description: String,
    pattern: String,
    #[serde(default = "default_severity")]
    severity: Severity,
    #[serde(default)]
    allow_if_cited: bool,
    #[serde(default)]
    proof_required: bool,
}

fn default_severity() -> Severity {
    Severity::Hard
}

impl BannedPatternFile {
    fn compile(&self) -> Result<BannedContentRule, TemplateError> {
        let pattern = Regex::new(&self.pattern)
            .map_err(|source| TemplateError::InvalidPattern { id: self.id.clone(), source })?;
        Ok(BannedContentRule {
            id: self.id.clone(),
            description: self.description.clone(),
            pattern,
            severity: self.severity,
            allow_if_cited: self.allow_if_cited,
            proof_required: self.proof_required,
        })
    }
}

impl TemplateFile {
    fn build(self) -> Result<ReportTemplate, TemplateError> {
        static SECTION_NAME_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

        if self.name.trim().is_empty() {
            return Err(TemplateError::Validation("template name must not be empty".to_string()));
        }
        if self.version == 0 {
            return Err(TemplateError::Validation("template version must be at least 1".to_string()));
        }
        if self.sections.is_empty() {
            return Err(TemplateError::Validation("template defines no sections".to_string()));
        }

        let mut subtopics = BTreeMap::new();
        for mapping in self.subtopics {
            if mapping.keys.is_empty() {
                return Err(TemplateError::Validation(format!(
                    "subtopic `{}` maps no keys",
                    mapping.tag
                )));
            }
            let tag = mapping.tag.clone();
            if subtopics.insert(tag.clone(), mapping).is_some() {
                return Err(TemplateError::Validation(format!("subtopic `{tag}` is mapped twice")));
            }
        }

        let global_rules =
            self.banned_patterns.iter().map(BannedPatternFile::compile).collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut sections = Vec::with_capacity(self.sections.len());
        for section in self.sections {
            if !SECTION_NAME_RE.is_match(&section.name) {
                return Err(TemplateError::Validation(format!(
                    "section name `{}` must match [a-z][a-z0-9_]*",
                    section.name
                )));
            }
            if !seen.insert(section.name.clone()) {
                return Err(TemplateError::Validation(format!(
                    "section `{}` is defined twice",
                    section.name
                )));
            }
            if section.max_length == 0 {
                return Err(TemplateError::Validation(format!(
                    "section `{}` max_length must be greater than zero",
                    section.name
                )));
            }
            if let Some(tag) = section
                .required_subtopics
                .iter()
                .chain(section.optional_subtopics.iter())
                .find(|tag| !subtopics.contains_key(*tag))
            {
                return Err(TemplateError::Validation(format!(
                    "section `{}` references unmapped subtopic `{tag}`",
                    section.name
                )));
            }

            let mut rules = global_rules.clone();
            for pattern in &section.banned_patterns {
                rules.push(pattern.compile()?);
            }

            sections.push(Arc::new(SectionSpec {
                name: section.name,
                title: section.title,
                required_subtopics: section.required_subtopics,
                optional_subtopics: section.optional_subtopics,
                banned_content_rules: rules,
                max_length: section.max_length,
            }));
        }

        for rule in &self.inference_rules {
            if rule.derived_key.trim().is_empty() || rule.trigger_keys.is_empty() {
                return Err(TemplateError::Validation(format!(
                    "inference rule `{}` needs a derived key and at least one trigger key",
                    rule.derived_key
                )));
            }
        }

        Ok(ReportTemplate {
            name: self.name,
            version: self.version,
            sections,
            subtopics,
            inference_rules: self.inference_rules,
            compliance_keys: self.compliance_keys.into_iter().collect(),
        })
    }
}
