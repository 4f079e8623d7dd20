use std::fmt;

use serde::{Deserialize, Serialize};

/// Trust tier of a fact's origin. Declaration order is precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTier {
    Attachment,
    Web,
    Inferred,
    Unknown,
}

impl SourceTier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Attachment => "ATTACHMENT",
            Self::Web => "WEB",
            Self::Inferred => "INFERRED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Tiers whose facts must point at a page, sheet or URL.
    pub fn requires_citation(&self) -> bool {
        matches!(self, Self::Attachment | Self::Web)
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Stated,
    Inferred,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Text(String),
    Structured(serde_json::Value),
}

impl FactValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Structured(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Structured(value) => value.is_null(),
        }
    }

    /// Comparison form used to decide whether two candidates disagree.
    pub fn normalized(&self) -> String {
        self.to_string().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Pointer back to the evidence: `drawing.pdf#p3`, `boq.xlsx!Sheet1`, a URL,
/// or `rfq:<field>` for intake fields. `excerpt` holds quoted source text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CitationRepr")]
pub struct Citation {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl Citation {
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: reference.into(), excerpt: None }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn is_blank(&self) -> bool {
        self.reference.trim().is_empty()
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CitationRepr {
    Reference(String),
    Full { reference: String, excerpt: Option<String> },
}

impl From<CitationRepr> for Citation {
    fn from(value: CitationRepr) -> Self {
        match value {
            CitationRepr::Reference(reference) => Self { reference, excerpt: None },
            CitationRepr::Full { reference, excerpt } => Self { reference, excerpt },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: FactValue,
    pub source_tier: SourceTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<Citation>,
    pub confidence: Confidence,
    #[serde(default)]
    pub numeric: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation: Option<String>,
}

impl Fact {
    pub fn stated(
        key: impl Into<String>,
        value: impl Into<FactValue>,
        source_tier: SourceTier,
        citation: Option<Citation>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source_tier,
            citation,
            confidence: Confidence::Stated,
            numeric: false,
            derivation: None,
        }
    }

    pub fn inferred(
        key: impl Into<String>,
        value: impl Into<FactValue>,
        derivation: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source_tier: SourceTier::Inferred,
            citation: None,
            confidence: Confidence::Inferred,
            numeric: false,
            derivation: Some(derivation.into()),
        }
    }

    pub fn with_numeric(mut self, numeric: bool) -> Self {
        self.numeric = numeric;
        self
    }

    pub fn has_citation(&self) -> bool {
        self.citation.as_ref().is_some_and(|citation| !citation.is_blank())
    }

    pub fn citation_reference(&self) -> Option<&str> {
        self.citation.as_ref().filter(|citation| !citation.is_blank()).map(|c| c.reference.as_str())
    }
}

/// A pre-normalized `(key, value, citation)` tuple handed over by the
/// extraction adapter. The classifier assigns tier and confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub key: String,
    pub value: FactValue,
    #[serde(default)]
    pub citation: Option<Citation>,
    #[serde(default)]
    pub numeric: bool,
}

impl FactCandidate {
    pub fn new(key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        Self { key: key.into(), value: value.into(), citation: None, numeric: false }
    }

    pub fn cited(mut self, citation: Citation) -> Self {
        self.citation = Some(citation);
        self
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }
}
