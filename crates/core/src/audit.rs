use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::fact::Fact;
use crate::domain::fact_set::FactSet;
use crate::domain::report::{Report, OUTPUT_CONTRACT_VERSION};
use crate::guard::RedactionNotice;
use crate::template::ReportTemplate;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Classification,
    Inference,
    Guard,
    Planning,
    Assembly,
    Validation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        correlation_id: impl Into<String>,
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Compliance side channel for a released report: what each section cited
/// and every redaction the guard applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditExport {
    pub run_id: String,
    pub template_name: String,
    pub template_version: u32,
    pub contract_version: String,
    pub fact_set_digest: String,
    pub sections: Vec<SectionAudit>,
    pub redactions: Vec<RedactionNotice>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionAudit {
    pub name: String,
    pub cited_facts: Vec<Fact>,
}

impl AuditExport {
    pub fn build(
        run_id: &str,
        template: &ReportTemplate,
        report: &Report,
        fact_set: &FactSet,
        redactions: &[RedactionNotice],
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            template_name: template.name.clone(),
            template_version: template.version,
            contract_version: OUTPUT_CONTRACT_VERSION.to_string(),
            fact_set_digest: fact_set.digest(),
            sections: report
                .sections
                .iter()
                .map(|section| SectionAudit {
                    name: section.name.clone(),
                    cited_facts: section.cited_facts.clone(),
                })
                .collect(),
            redactions: redactions.to_vec(),
            generated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
