use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::fact::SourceTier;
use crate::domain::report::Report;
use crate::validator::ValidationIssue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    EmptyKey,
    MissingCitation,
    UncitedNumeric,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyKey => "candidate has an empty key",
            Self::MissingCitation => "candidate has no citation",
            Self::UncitedNumeric => "numeric candidate has no citation",
        })
    }
}

/// Bad input shape. Fatal for the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed fact `{key}` at {tier} tier: {reason}")]
pub struct MalformedFactError {
    pub key: String,
    pub tier: SourceTier,
    pub reason: MalformedReason,
}

/// The external generator failed or timed out for one section.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("generation unavailable for section `{section}`: {reason}")]
pub struct GenerationUnavailableError {
    pub section: String,
    pub reason: String,
    pub timed_out: bool,
}

/// Sections that completed are kept in `completed`; the caller decides
/// whether to retry the failed ones.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("generation failed for {} section(s): {}", .failures.len(), failed_sections(.failures))]
pub struct AssemblyError {
    pub completed: Report,
    pub failures: Vec<GenerationUnavailableError>,
}

fn failed_sections(failures: &[GenerationUnavailableError]) -> String {
    failures.iter().map(|failure| failure.section.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] MalformedFactError),
    #[error(transparent)]
    Generation(#[from] AssemblyError),
    #[error("validation blocked release: {}", hard_rules(.issues))]
    ValidationHardFailure { issues: Vec<ValidationIssue> },
}

fn hard_rules(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| match &issue.section {
            Some(section) => format!("{}@{}", issue.rule, section),
            None => issue.rule.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Inference,
    Guard,
    Planning,
    Assembly,
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classification => "classification",
            Self::Inference => "inference",
            Self::Guard => "guard",
            Self::Planning => "planning",
            Self::Assembly => "assembly",
            Self::Validation => "validation",
        })
    }
}

/// Diagnostic returned for a failed run: which stage failed and why.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed for run {correlation_id}: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub correlation_id: String,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, correlation_id: impl Into<String>, error: PipelineError) -> Self {
        Self { stage, correlation_id: correlation_id.into(), error }
    }

    pub fn user_message(&self) -> &'static str {
        match &self.error {
            PipelineError::Malformed(_) => {
                "The RFQ input could not be processed. Check the extracted facts and try again."
            }
            PipelineError::Generation(_) => {
                "Briefing text could not be generated for every section. Retry the run shortly."
            }
            PipelineError::ValidationHardFailure { .. } => {
                "The briefing was withheld because it contained unverifiable figures or claims."
            }
        }
    }

    /// Whether re-running with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.error,
            PipelineError::Generation(_) | PipelineError::ValidationHardFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::fact::SourceTier;
    use crate::domain::report::Report;
    use crate::domain::section::Severity;
    use crate::validator::ValidationIssue;

    use super::{
        AssemblyError, GenerationUnavailableError, MalformedFactError, MalformedReason,
        PipelineError, PipelineFailure, Stage,
    };

    #[test]
    fn malformed_fact_is_fatal_and_names_the_key() {
        let failure = PipelineFailure::new(
            Stage::Classification,
            "run-1",
            PipelineError::from(MalformedFactError {
                key: "unit_price".to_string(),
                tier: SourceTier::Attachment,
                reason: MalformedReason::UncitedNumeric,
            }),
        );

        assert!(!failure.is_retryable());
        let message = failure.to_string();
        assert!(message.contains("classification"));
        assert!(message.contains("unit_price"));
        assert!(failure.user_message().contains("could not be processed"));
    }

    #[test]
    fn assembly_error_lists_failed_sections() {
        let error = AssemblyError {
            completed: Report::default(),
            failures: vec![GenerationUnavailableError {
                section: "cost".to_string(),
                reason: "timed out after 30s".to_string(),
                timed_out: true,
            }],
        };
        assert_eq!(error.to_string(), "generation failed for 1 section(s): cost");

        let failure = PipelineFailure::new(Stage::Assembly, "run-2", error.into());
        assert!(failure.is_retryable());
    }

    #[test]
    fn hard_validation_failure_summarizes_rules() {
        let error = PipelineError::ValidationHardFailure {
            issues: vec![ValidationIssue {
                section: Some("cost".to_string()),
                rule: "bare_unit_price".to_string(),
                severity: Severity::Hard,
                detail: "$120".to_string(),
            }],
        };
        assert_eq!(error.to_string(), "validation blocked release: bare_unit_price@cost");
    }
}
