//! RFQ intake record and the run input handed to the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::fact::{FactCandidate, FactValue};

/// Structured RFQ fields as the intake form sends them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RfqRecord {
    #[serde(default, alias = "rowID")]
    pub row_id: String,
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(default, alias = "Industry")]
    pub industry: String,
    #[serde(default, alias = "Geography")]
    pub geography: String,
    #[serde(default, alias = "Standard")]
    pub standard: String,
    #[serde(default, alias = "Customer name")]
    pub customer_name: String,
    /// Product list: a JSON string (possibly the broken `{..}, {..}` form),
    /// an object or an array.
    #[serde(default, alias = "Product_json")]
    pub product_json: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductItem {
    pub name: String,
    pub qty: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwg: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photo: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl RfqRecord {
    /// Parsed product list. Unparseable input yields no products.
    pub fn products(&self) -> Vec<ProductItem> {
        let objects = match &self.product_json {
            Value::String(raw) => parse_product_json(raw),
            Value::Object(object) => vec![object.clone()],
            Value::Array(items) => items.iter().filter_map(|item| item.as_object().cloned()).collect(),
            _ => Vec::new(),
        };
        objects.iter().map(product_from_object).collect()
    }

    /// Attachment links across all products, cleaned and deduplicated.
    pub fn attachment_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        for product in self.products() {
            let raw = product.dwg.iter().chain(product.photo.iter()).chain(product.files.iter());
            for url in raw.map(|url| clean_url(url)) {
                if !url.is_empty() && !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        urls
    }

    /// RFQ-field fact candidates. Citations are assigned by the classifier.
    pub fn to_candidates(&self) -> Vec<FactCandidate> {
        let mut candidates = Vec::new();
        let mut push = |key: &str, value: &str, numeric: bool| {
            let value = value.trim();
            if !value.is_empty() {
                let candidate = FactCandidate::new(key, value);
                candidates.push(if numeric { candidate.numeric() } else { candidate });
            }
        };

        push("title", &self.title, false);
        push("customer", &self.customer_name, false);
        push("industry", &self.industry, false);
        push("geography", &self.geography, false);
        push("standard", &self.standard, false);

        let products = self.products();
        if let Some(first) = products.first() {
            push("product", &first.name, false);
            push("qty", &first.qty, true);
            push("details", &first.details, false);
            if let Some(dwg) = &first.dwg {
                push("drawing", &clean_url(dwg), false);
            }
        }

        if products.len() > 1 {
            let listed = products
                .iter()
                .map(|product| {
                    serde_json::json!({
                        "name": product.name,
                        "qty": product.qty,
                        "details": product.details,
                    })
                })
                .collect::<Vec<_>>();
            candidates.push(FactCandidate::new("products", FactValue::Structured(Value::Array(listed))));
        }

        candidates
    }
}

/// Everything one briefing run consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BriefingInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfq: Option<RfqRecord>,
    /// Extra RFQ-field candidates beyond the intake record.
    #[serde(default)]
    pub rfq_fields: Vec<FactCandidate>,
    #[serde(default)]
    pub attachment_facts: Vec<FactCandidate>,
    #[serde(default)]
    pub web_facts: Vec<FactCandidate>,
}

impl BriefingInput {
    pub fn rfq_candidates(&self) -> Vec<FactCandidate> {
        let mut candidates = self.rfq.as_ref().map(RfqRecord::to_candidates).unwrap_or_default();
        candidates.extend(self.rfq_fields.iter().cloned());
        candidates
    }
}

fn parse_product_json(raw: &str) -> Vec<Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        return objects_of(parsed);
    }

    // Repair the `{...}, {...}` form by wrapping it in a list.
    let compact = trimmed.trim_end_matches(',').replace(['\n', '\r'], " ");
    let compact = compact.trim();
    let multi_object = compact.starts_with('{')
        && (compact.replace(' ', "").contains("},{") || compact.contains("}, {"));
    if !multi_object {
        return Vec::new();
    }
    serde_json::from_str::<Value>(&format!("[{compact}]")).map(objects_of).unwrap_or_default()
}

fn objects_of(value: Value) -> Vec<Map<String, Value>> {
    match value {
        Value::Object(object) => vec![object],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(object) => Some(object),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn product_from_object(object: &Map<String, Value>) -> ProductItem {
    let field = |upper: &str, lower: &str| {
        object.get(upper).or_else(|| object.get(lower)).map(value_text).unwrap_or_default()
    };
    let list = |key: &str| match object.get(key) {
        Some(Value::Array(items)) => items.iter().map(value_text).filter(|url| !url.is_empty()).collect(),
        Some(Value::String(url)) if !url.trim().is_empty() => vec![url.clone()],
        _ => Vec::new(),
    };

    let dwg = field("Dwg", "dwg");
    ProductItem {
        name: field("Name", "name"),
        qty: field("Qty", "qty"),
        details: field("Details", "details"),
        dwg: (!dwg.trim().is_empty()).then_some(dwg),
        photo: list("photo"),
        files: list("files"),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

/// Normalises a pasted attachment link: quotes and trailing punctuation
/// dropped, literal spaces encoded.
pub fn clean_url(url: &str) -> String {
    let quoted = |text: &str, quote: char| text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote);
    let mut cleaned = url.trim();
    loop {
        let before = cleaned.len();
        cleaned = cleaned.trim_end_matches(|ch: char| matches!(ch, ')' | ']' | '}' | ',') || ch.is_whitespace());
        if quoted(cleaned, '"') || quoted(cleaned, '\'') {
            cleaned = cleaned[1..cleaned.len() - 1].trim();
        }
        if cleaned.len() == before {
            break;
        }
    }
    cleaned.replace(['\n', '\r'], "").trim().replace(' ', "%20")
}
