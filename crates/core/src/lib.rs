pub mod assembler;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod guard;
pub mod inference;
pub mod intake;
pub mod pipeline;
pub mod planner;
pub mod provenance;
pub mod template;
pub mod validator;

pub use assembler::{
    AssemblySettings, ContentContract, FactSheetGenerator, GenerationRequest, ReportAssembler,
    SectionGenerator,
};
pub use audit::{AuditEvent, AuditExport, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::fact::{Citation, Confidence, Fact, FactCandidate, FactValue, SourceTier};
pub use domain::fact_set::FactSet;
pub use domain::query::Query;
pub use domain::report::{Report, Section, OUTPUT_CONTRACT_VERSION};
pub use domain::section::{SectionSpec, Severity};
pub use errors::{
    AssemblyError, GenerationUnavailableError, MalformedFactError, PipelineError, PipelineFailure,
    Stage,
};
pub use guard::{FabricationGuard, RedactionNotice, RedactionReason};
pub use inference::{infer, InferenceRule};
pub use intake::{BriefingInput, RfqRecord};
pub use pipeline::{BriefingOutcome, BriefingPipeline, PreparedBrief};
pub use planner::{plan, SectionPlan};
pub use provenance::ProvenanceClassifier;
pub use template::{ReportTemplate, TemplateError, TemplateRegistry};
pub use validator::{validate, validate_document, ValidationIssue, ValidationResult};
