use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks release of the report.
    Hard,
    /// Logged, report still released.
    Soft,
}

/// A pattern generated text must not contain.
#[derive(Clone, Debug)]
pub struct BannedContentRule {
    pub id: String,
    pub description: String,
    pub pattern: Regex,
    pub severity: Severity,
    /// Tolerate a match when a citation on the same line resolves to a fact
    /// whose value contains the matched text.
    pub allow_if_cited: bool,
    /// The backing fact must also quote proof of conformity.
    pub proof_required: bool,
}

/// One named output unit of the report template.
#[derive(Clone, Debug)]
pub struct SectionSpec {
    pub name: String,
    pub title: String,
    pub required_subtopics: Vec<String>,
    pub optional_subtopics: Vec<String>,
    pub banned_content_rules: Vec<BannedContentRule>,
    /// Soft budget in characters for the rendered body.
    pub max_length: usize,
}

impl SectionSpec {
    pub fn subtopics(&self) -> impl Iterator<Item = &str> {
        self.required_subtopics.iter().chain(self.optional_subtopics.iter()).map(String::as_str)
    }
}

/// Row of the key-to-subtopic table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtopicMapping {
    pub tag: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub blocking: bool,
    /// Query text for an unresolved key; `{{key}}` is substituted.
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub impact: String,
}

impl SubtopicMapping {
    pub fn question_for(&self, key: &str) -> String {
        self.question
            .as_deref()
            .unwrap_or("Please confirm the {{key}} for this RFQ.")
            .replace("{{key}}", &key.replace('_', " "))
    }
}
