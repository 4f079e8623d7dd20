//! Structural validation of the rendered document against the template.
//!
//! Checks marker structure, required sections, order, banned patterns and
//! length budgets. Hard issues block release; soft issues are logged.
//!
//! A banned literal next to a `[cite:...]` marker is only tolerated when the
//! marker resolves to a cited fact that carries the literal. Standalone
//! documents have no facts to resolve against, so every banned literal in
//! them is reported.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::assembler::citation_markers;
use crate::domain::fact::Fact;
use crate::domain::report::Report;
use crate::domain::section::{BannedContentRule, SectionSpec, Severity};
use crate::guard::has_conformity_proof;
use crate::template::ReportTemplate;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub section: Option<String>,
    pub rule: String,
    pub severity: Severity,
    pub detail: String,
}

impl ValidationIssue {
    fn hard(section: Option<&str>, rule: &str, detail: impl Into<String>) -> Self {
        Self::new(section, rule, Severity::Hard, detail)
    }

    fn soft(section: Option<&str>, rule: &str, detail: impl Into<String>) -> Self {
        Self::new(section, rule, Severity::Soft, detail)
    }

    fn new(section: Option<&str>, rule: &str, severity: Severity, detail: impl Into<String>) -> Self {
        Self { section: section.map(str::to_string), rule: rule.to_string(), severity, detail: detail.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_releasable(&self) -> bool {
        self.issues.iter().all(|issue| issue.severity == Severity::Soft)
    }

    pub fn hard_issues(&self) -> Vec<ValidationIssue> {
        self.by_severity(Severity::Hard)
    }

    pub fn soft_issues(&self) -> Vec<ValidationIssue> {
        self.by_severity(Severity::Soft)
    }

    fn by_severity(&self, severity: Severity) -> Vec<ValidationIssue> {
        self.issues.iter().filter(|issue| issue.severity == severity).cloned().collect()
    }
}

/// Validates an assembled report: the rendered document plus the citation
/// markers the assembler could not resolve.
pub fn validate(report: &Report, template: &ReportTemplate) -> ValidationResult {
    let mut result = check_document(&report.render(), template, Some(report));
    for section in &report.sections {
        for orphan in &section.orphan_citations {
            result.issues.push(ValidationIssue::hard(
                Some(&section.name),
                "orphan_citation",
                format!("[cite:{orphan}] does not resolve to a fact in this section's plan"),
            ));
        }
    }
    log_issues(&result);
    result
}

/// Validates a rendered document on its own, e.g. one produced elsewhere.
pub fn validate_document(text: &str, template: &ReportTemplate) -> ValidationResult {
    check_document(text, template, None)
}

fn check_document(text: &str, template: &ReportTemplate, report: Option<&Report>) -> ValidationResult {
    let (blocks, mut issues) = split_blocks(text, template);

    for spec in template.sections() {
        match blocks.iter().filter(|block| block.name == spec.name).count() {
            0 => issues.push(ValidationIssue::hard(
                Some(&spec.name),
                "missing_section",
                format!("required section `{}` is absent", spec.name),
            )),
            1 => {}
            count => issues.push(ValidationIssue::hard(
                Some(&spec.name),
                "duplicate_section",
                format!("section `{}` appears {count} times", spec.name),
            )),
        }
    }

    let expected = template.section_names();
    let mut actual = Vec::new();
    for block in &blocks {
        if expected.contains(&block.name.as_str()) && !actual.contains(&block.name.as_str()) {
            actual.push(block.name.as_str());
        }
    }
    let expected_present = expected.iter().filter(|name| actual.contains(name)).copied().collect::<Vec<_>>();
    if actual != expected_present {
        issues.push(ValidationIssue::soft(
            None,
            "section_order",
            format!("expected order {}, found {}", expected_present.join(", "), actual.join(", ")),
        ));
    }

    for block in &blocks {
        let Some(spec) = template.section(&block.name) else {
            continue;
        };
        let cited_facts = report
            .and_then(|report| report.section(&block.name))
            .map(|section| section.cited_facts.as_slice())
            .unwrap_or_default();
        check_banned_content(spec, &block.body, cited_facts, &mut issues);

        let length = block.body.chars().count();
        if length > spec.max_length {
            issues.push(ValidationIssue::soft(
                Some(&spec.name),
                "length_budget",
                format!("{length} characters exceeds budget of {}", spec.max_length),
            ));
        }
    }

    ValidationResult { issues }
}

struct Block {
    name: String,
    body: String,
}

fn split_blocks(text: &str, template: &ReportTemplate) -> (Vec<Block>, Vec<ValidationIssue>) {
    static MARKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^<(/?)([A-Za-z][A-Za-z0-9_\-]*)>$").expect("valid regex"));

    let mut blocks = Vec::new();
    let mut issues = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let marker = MARKER_RE
            .captures(line.trim())
            .map(|captures| (captures[1].is_empty(), captures[2].to_string()));

        match (open.take(), marker) {
            (None, Some((true, name))) => {
                if template.section(&name).is_none() {
                    issues.push(ValidationIssue::hard(
                        Some(&name),
                        "unknown_section",
                        format!("line {line_number}: `<{name}>` is not a section of this template"),
                    ));
                }
                open = Some((name, Vec::new()));
            }
            (None, Some((false, name))) => issues.push(ValidationIssue::hard(
                Some(&name),
                "stray_close_marker",
                format!("line {line_number}: `</{name}>` closes no open section"),
            )),
            (None, None) => {
                if !line.trim().is_empty() {
                    issues.push(ValidationIssue::hard(
                        None,
                        "content_outside_markers",
                        format!("line {line_number}: text outside any section"),
                    ));
                }
            }
            (Some((current, body)), Some((false, name))) if name == current => {
                blocks.push(Block { name: current, body: body.join("\n") });
            }
            (Some((current, body)), Some((_, name))) => {
                issues.push(ValidationIssue::hard(
                    Some(&current),
                    "nested_marker",
                    format!("line {line_number}: marker for `{name}` inside open section `{current}`"),
                ));
                open = Some((current, body));
            }
            (Some((current, mut body)), None) => {
                body.push(line);
                open = Some((current, body));
            }
        }
    }

    if let Some((current, body)) = open {
        issues.push(ValidationIssue::hard(
            Some(&current),
            "unterminated_section",
            format!("section `{current}` is never closed"),
        ));
        blocks.push(Block { name: current, body: body.join("\n") });
    }

    (blocks, issues)
}

fn check_banned_content(
    spec: &SectionSpec,
    body: &str,
    cited_facts: &[Fact],
    issues: &mut Vec<ValidationIssue>,
) {
    for line in body.lines() {
        let references = citation_markers(line);
        let backing = cited_facts
            .iter()
            .filter(|fact| {
                fact.citation_reference()
                    .is_some_and(|reference| references.iter().any(|marker| marker == reference))
            })
            .collect::<Vec<_>>();

        for rule in &spec.banned_content_rules {
            let unbacked = rule
                .pattern
                .find_iter(line)
                .find(|found| !is_backed(rule, found.as_str(), &backing));
            if let Some(found) = unbacked {
                issues.push(ValidationIssue::new(
                    Some(&spec.name),
                    &rule.id,
                    rule.severity,
                    format!("`{}`: {}", found.as_str().trim(), rule.description),
                ));
            }
        }
    }
}

/// Whether a banned literal is carried by one of the facts cited on its line.
fn is_backed(rule: &BannedContentRule, literal: &str, backing: &[&Fact]) -> bool {
    if !rule.allow_if_cited {
        return false;
    }
    let needle = squash(literal.trim_start_matches(|c: char| !c.is_alphanumeric() && !is_currency(c)));
    if needle.is_empty() {
        return false;
    }
    backing.iter().any(|fact| {
        squash(&fact.value.to_string()).contains(&needle)
            && (!rule.proof_required || has_conformity_proof(fact))
    })
}

fn is_currency(c: char) -> bool {
    matches!(c, '$' | '₹' | '€' | '£')
}

fn squash(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

fn log_issues(result: &ValidationResult) {
    for issue in &result.issues {
        warn!(
            event_name = "pipeline.validation.issue",
            section = issue.section.as_deref().unwrap_or("-"),
            rule = %issue.rule,
            severity = ?issue.severity,
            detail = %issue.detail,
            "validation issue"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::fact::{Citation, Fact, FactValue, SourceTier};
    use crate::domain::report::{Report, Section};
    use crate::domain::section::Severity;
    use crate::template::ReportTemplate;

    use super::{validate, validate_document};

    fn template() -> ReportTemplate {
        ReportTemplate::embedded().expect("embedded template")
    }

    fn section(name: &str, body: &str) -> Section {
        Section {
            name: name.to_string(),
            body: body.to_string(),
            cited_facts: Vec::new(),
            orphan_citations: Vec::new(),
            queries: Vec::new(),
        }
    }

    fn full_report() -> Report {
        Report {
            sections: ["summary", "scope", "cost", "quality", "timeline"]
                .iter()
                .map(|name| section(name, "Qualitative text only."))
                .collect(),
        }
    }

    fn rules(result: &super::ValidationResult) -> Vec<&str> {
        result.issues.iter().map(|issue| issue.rule.as_str()).collect()
    }

    #[test]
    fn complete_report_is_releasable() {
        let result = validate(&full_report(), &template());
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        assert!(result.is_releasable());
    }

    #[test]
    fn each_missing_section_is_a_hard_failure() {
        for missing in ["summary", "scope", "cost", "quality", "timeline"] {
            let mut report = full_report();
            report.sections.retain(|section| section.name != missing);

            let result = validate(&report, &template());
            assert!(!result.is_releasable(), "{missing} should block release");
            assert_eq!(result.hard_issues()[0].section.as_deref(), Some(missing));
            assert_eq!(result.hard_issues()[0].rule, "missing_section");
        }
    }

    #[test]
    fn out_of_order_sections_are_soft() {
        let mut report = full_report();
        report.sections.swap(0, 4);

        let result = validate(&report, &template());
        assert!(result.is_releasable());
        assert_eq!(rules(&result), vec!["section_order"]);
    }

    fn cited_fact(key: &str, value: &str, citation: Citation) -> Fact {
        Fact::stated(key, FactValue::text(value), SourceTier::Web, Some(citation))
    }

    #[test]
    fn bare_price_is_hard_but_cited_price_is_allowed() {
        let mut report = full_report();
        report.sections[2].body = "Unit price around ₹240/kg for the blank.".to_string();
        let result = validate(&report, &template());
        assert!(!result.is_releasable());
        assert!(rules(&result).contains(&"bare_inr_unit_rate"));

        report.sections[2].body = "Listed at $4.20 per piece [cite:https://supplier.example/list]".to_string();
        report.sections[2].cited_facts.push(cited_fact(
            "unit_price",
            "$4.20 per piece",
            Citation::new("https://supplier.example/list"),
        ));
        assert!(validate(&report, &template()).is_releasable());
    }

    #[test]
    fn price_beside_an_unrelated_citation_is_hard() {
        let mut report = full_report();
        report.sections[2].body = "Expect $999 per piece [cite:rfq:material]".to_string();
        report.sections[2].cited_facts.push(cited_fact("material", "Stainless steel 304", Citation::new("rfq:material")));

        let result = validate(&report, &template());
        assert!(!result.is_releasable());
        assert!(rules(&result).contains(&"bare_usd_price"));
    }

    #[test]
    fn second_price_on_a_cited_line_is_hard() {
        let mut report = full_report();
        report.sections[2].body = "Listed at $4.20, expect $3.10 at volume [cite:https://supplier.example/list]".to_string();
        report.sections[2].cited_facts.push(cited_fact(
            "unit_price",
            "$4.20 per piece",
            Citation::new("https://supplier.example/list"),
        ));

        let result = validate(&report, &template());
        let issue = result.hard_issues().into_iter().find(|issue| issue.rule == "bare_usd_price").expect("issue");
        assert!(issue.detail.contains("$3.10"));
    }

    #[test]
    fn unqualified_compliance_claim_is_hard() {
        let mut report = full_report();
        report.sections[3].body = "Parts are CE compliant.".to_string();
        let result = validate(&report, &template());
        assert!(rules(&result).contains(&"unqualified_compliance"));

        report.sections[3].body = "CE required / to be confirmed".to_string();
        assert!(validate(&report, &template()).is_releasable());
    }

    #[test]
    fn cited_compliance_claim_needs_quoted_proof() {
        let mut report = full_report();
        report.sections[3].body = "Parts are CE compliant [cite:rfq:standard]".to_string();
        report.sections[3].cited_facts.push(cited_fact("standard", "CE compliant", Citation::new("rfq:standard")));
        let result = validate(&report, &template());
        assert!(rules(&result).contains(&"unqualified_compliance"));

        report.sections[3].body = "Parts are CE compliant [cite:doc.pdf#p4]".to_string();
        report.sections[3].cited_facts = vec![cited_fact(
            "certification",
            "CE compliant",
            Citation::new("doc.pdf#p4").with_excerpt("EU declaration of conformity, CE marked"),
        )];
        assert!(validate(&report, &template()).is_releasable());
    }

    #[test]
    fn standalone_document_never_exempts_cited_literals() {
        let mut report = full_report();
        report.sections[2].body = "Listed at $4.20 per piece [cite:https://supplier.example/list]".to_string();
        report.sections[2].cited_facts.push(cited_fact(
            "unit_price",
            "$4.20 per piece",
            Citation::new("https://supplier.example/list"),
        ));
        assert!(validate(&report, &template()).is_releasable());

        let result = validate_document(&report.render(), &template());
        assert!(!result.is_releasable());
        assert!(rules(&result).contains(&"bare_usd_price"));
    }

    #[test]
    fn percentage_rule_applies_to_cost_only() {
        let mut report = full_report();
        report.sections[0].body = "Scrap under 5% expected.".to_string();
        assert!(validate(&report, &template()).is_releasable());

        report.sections[2].body = "Margin of 18% applies.".to_string();
        assert!(rules(&validate(&report, &template())).contains(&"bare_percentage"));

        report.sections[2].body = "Typical margin band 10-15% for this tier.".to_string();
        assert!(validate(&report, &template()).is_releasable());
    }

    #[test]
    fn orphan_citation_is_hard() {
        let mut report = full_report();
        report.sections[1].orphan_citations.push("ghost.pdf#p9".to_string());
        let result = validate(&report, &template());
        assert!(!result.is_releasable());
        assert_eq!(rules(&result), vec!["orphan_citation"]);
    }

    #[test]
    fn length_budget_overrun_is_soft() {
        let mut report = full_report();
        report.sections[4].body = "x".repeat(1300);
        let result = validate(&report, &template());
        assert!(result.is_releasable());
        assert_eq!(result.soft_issues()[0].rule, "length_budget");
    }

    #[test]
    fn document_structure_violations_are_hard() {
        let text = "Preamble\n<summary>\nok\n</summary>\n<pricing>\nx\n</pricing>\n<scope>\n<cost>\n";
        let result = validate_document(text, &template());
        let found = rules(&result);

        for rule in ["content_outside_markers", "unknown_section", "nested_marker", "unterminated_section", "missing_section"] {
            assert!(found.contains(&rule), "expected {rule} in {found:?}");
        }
        assert!(result.issues.iter().all(|issue| issue.severity == Severity::Hard
            || issue.rule == "section_order"));
    }

    #[test]
    fn duplicate_section_is_hard() {
        let mut report = full_report();
        report.sections.push(section("timeline", "Again."));
        let result = validate(&report, &template());
        assert!(rules(&result).contains(&"duplicate_section"));
    }
}
