use serde::{Deserialize, Serialize};

/// An open question blocking a confident quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub impact: String,
    pub target_section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub blocking: bool,
}

impl Query {
    /// Dedupe key: case-folded, punctuation dropped, whitespace collapsed.
    pub fn normalized_text(&self) -> String {
        self.text
            .chars()
            .map(|ch| if ch.is_alphanumeric() { ch.to_ascii_lowercase() } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn normalized_text_ignores_case_and_punctuation() {
        let left = Query {
            text: "What is the order Quantity?".to_string(),
            impact: String::new(),
            target_section: "scope".to_string(),
            key: None,
            blocking: true,
        };
        let right = Query { text: "what is the  order quantity".to_string(), ..left.clone() };
        assert_eq!(left.normalized_text(), right.normalized_text());
    }
}
