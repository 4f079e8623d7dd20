//! Briefing pipeline: classify, infer, guard, plan, assemble, validate.
//!
//! The first four stages are pure and fail fast before any generation call.
//! Assembly is the only suspending stage; validation runs after every
//! section has completed.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::assembler::{AssemblySettings, ReportAssembler, SectionGenerator};
use crate::audit::{AuditCategory, AuditEvent, AuditExport, AuditOutcome, AuditSink, NoopAuditSink};
use crate::domain::fact_set::FactSet;
use crate::domain::query::Query;
use crate::domain::report::Report;
use crate::errors::{PipelineError, PipelineFailure, Stage};
use crate::guard::{FabricationGuard, RedactionNotice};
use crate::inference::infer;
use crate::intake::BriefingInput;
use crate::planner::{plan, SectionPlan};
use crate::provenance::ProvenanceClassifier;
use crate::template::ReportTemplate;
use crate::validator::{validate, ValidationResult};

const ACTOR: &str = "rfqbrief-pipeline";

/// Short run identifier used as the correlation id in logs and audit.
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Output of the pure stages, ready for assembly.
#[derive(Clone, Debug, Serialize)]
pub struct PreparedBrief {
    pub fact_set: FactSet,
    pub redactions: Vec<RedactionNotice>,
    pub plans: Vec<SectionPlan>,
}

impl PreparedBrief {
    pub fn queries(&self) -> Vec<&Query> {
        self.plans.iter().flat_map(|plan| plan.queries.iter()).collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BriefingOutcome {
    pub run_id: String,
    pub report: Report,
    pub rendered: String,
    pub validation: ValidationResult,
    pub fact_set: FactSet,
    pub redactions: Vec<RedactionNotice>,
    pub audit: AuditExport,
}

#[derive(Clone)]
pub struct BriefingPipeline {
    template: Arc<ReportTemplate>,
    generator: Arc<dyn SectionGenerator>,
    settings: AssemblySettings,
    audit_sink: Arc<dyn AuditSink>,
}

impl BriefingPipeline {
    pub fn new(template: Arc<ReportTemplate>, generator: Arc<dyn SectionGenerator>) -> Self {
        Self {
            template,
            generator,
            settings: AssemblySettings::default(),
            audit_sink: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_settings(mut self, settings: AssemblySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn template(&self) -> &Arc<ReportTemplate> {
        &self.template
    }

    /// Classification, inference, guard and planning. No side effects other
    /// than audit events.
    pub fn prepare(&self, input: &BriefingInput, run_id: &str) -> Result<PreparedBrief, PipelineFailure> {
        let classifier = ProvenanceClassifier::new(self.template.required_keys());
        let classified = classifier
            .classify(&input.rfq_candidates(), &input.attachment_facts, &input.web_facts)
            .map_err(|source| {
                self.emit(run_id, "classification.rejected", AuditCategory::Classification, AuditOutcome::Rejected, [
                    ("key", source.key.clone()),
                    ("reason", source.reason.to_string()),
                ]);
                self.fail(Stage::Classification, run_id, source.into())
            })?;
        self.emit(run_id, "classification.completed", AuditCategory::Classification, AuditOutcome::Success, [
            ("facts", classified.len().to_string()),
            ("unknown", classified.unknown_keys().len().to_string()),
            ("conflicted", classified.conflicted_keys().len().to_string()),
        ]);

        let inferred = infer(&classified, self.template.inference_rules());
        self.emit(run_id, "inference.completed", AuditCategory::Inference, AuditOutcome::Success, [(
            "derived",
            (inferred.len() - classified.len()).to_string(),
        )]);

        let guard = FabricationGuard::new(self.template.compliance_keys().iter().cloned());
        let (fact_set, redactions) = guard.guard(&inferred);
        for notice in &redactions {
            self.emit(run_id, "guard.redacted", AuditCategory::Guard, AuditOutcome::Rejected, [
                ("key", notice.key.clone()),
                ("reason", notice.reason.as_str().to_string()),
                ("tier", notice.source_tier.label().to_string()),
            ]);
        }

        let plans = plan(&fact_set, &self.template);
        let query_count = plans.iter().map(|plan| plan.queries.len()).sum::<usize>();
        self.emit(run_id, "planning.completed", AuditCategory::Planning, AuditOutcome::Success, [
            ("sections", plans.len().to_string()),
            ("queries", query_count.to_string()),
        ]);

        Ok(PreparedBrief { fact_set, redactions, plans })
    }

    pub async fn run(&self, input: &BriefingInput) -> Result<BriefingOutcome, PipelineFailure> {
        let run_id = new_run_id();
        self.run_with_id(input, &run_id).await
    }

    pub async fn run_with_id(&self, input: &BriefingInput, run_id: &str) -> Result<BriefingOutcome, PipelineFailure> {
        info!(
            event_name = "pipeline.run.started",
            correlation_id = %run_id,
            template = %self.template.name,
            template_version = self.template.version,
            "briefing run started"
        );

        let prepared = self.prepare(input, run_id)?;

        let assembler = ReportAssembler::new(Arc::clone(&self.generator), self.settings);
        let report = assembler.assemble(&prepared.plans, run_id).await.map_err(|source| {
            for failure in &source.failures {
                self.emit(run_id, "assembly.section_failed", AuditCategory::Assembly, AuditOutcome::Failed, [
                    ("section", failure.section.clone()),
                    ("timed_out", failure.timed_out.to_string()),
                ]);
            }
            self.fail(Stage::Assembly, run_id, source.into())
        })?;
        self.emit(run_id, "assembly.completed", AuditCategory::Assembly, AuditOutcome::Success, [(
            "sections",
            report.sections.len().to_string(),
        )]);

        let validation = validate(&report, &self.template);
        if !validation.is_releasable() {
            let issues = validation.hard_issues();
            self.emit(run_id, "validation.blocked", AuditCategory::Validation, AuditOutcome::Rejected, [(
                "hard_issues",
                issues.len().to_string(),
            )]);
            return Err(self.fail(Stage::Validation, run_id, PipelineError::ValidationHardFailure { issues }));
        }
        self.emit(run_id, "validation.passed", AuditCategory::Validation, AuditOutcome::Success, [(
            "soft_issues",
            validation.soft_issues().len().to_string(),
        )]);

        let audit =
            AuditExport::build(run_id, &self.template, &report, &prepared.fact_set, &prepared.redactions);
        info!(
            event_name = "pipeline.run.released",
            correlation_id = %run_id,
            sections = report.sections.len(),
            redactions = prepared.redactions.len(),
            "briefing released"
        );

        Ok(BriefingOutcome {
            run_id: run_id.to_string(),
            rendered: report.render(),
            report,
            validation,
            fact_set: prepared.fact_set,
            redactions: prepared.redactions,
            audit,
        })
    }

    fn fail(&self, stage: Stage, run_id: &str, error: PipelineError) -> PipelineFailure {
        let failure = PipelineFailure::new(stage, run_id, error);
        error!(
            event_name = "pipeline.run.failed",
            correlation_id = %run_id,
            stage = %stage,
            error = %failure.error,
            "briefing run failed"
        );
        failure
    }

    fn emit<const N: usize>(
        &self,
        run_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: [(&str, String); N],
    ) {
        let event = metadata.into_iter().fold(
            AuditEvent::new(run_id, event_type, category, ACTOR, outcome),
            |event, (key, value)| event.with_metadata(key, value),
        );
        self.audit_sink.emit(event);
    }
}
