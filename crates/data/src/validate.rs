use serde_json::Value;
use std::collections::HashSet;

pub const VALID_CATEGORIES: &[&str] = &["tactical", "weaponry", "social", "contract"];
pub const VALID_ID_PREFIXES: &[&str] = &["TAC", "WEP", "SOC", "CON", "SPE"];

/// `SPE` is a wildcard prefix and is accepted for every category.
const PREFIX_CATEGORIES: &[(&str, &str)] = &[
    ("TAC", "tactical"),
    ("WEP", "weaponry"),
    ("SOC", "social"),
    ("CON", "contract"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub total: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            format!(
                "validation: {}",
                if self.is_valid() { "passed" } else { "failed" }
            ),
            format!("rules: {}", self.total),
            format!("errors: {}", self.errors.len()),
            format!("warnings: {}", self.warnings.len()),
        ];
        if !self.errors.is_empty() {
            lines.push(String::new());
            lines.push("errors:".to_string());
            lines.extend(self.errors.iter().map(|err| format!("  - {err}")));
        }
        if !self.warnings.is_empty() {
            lines.push(String::new());
            lines.push("warnings:".to_string());
            lines.extend(self.warnings.iter().map(|warn| format!("  - {warn}")));
        }
        lines.join("\n")
    }
}

pub fn validate_rules(data: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(items) = data.as_array() else {
        report.errors.push("rule data must be an array".to_string());
        return report;
    };
    report.total = items.len();
    if items.is_empty() {
        report.warnings.push("rule data is empty".to_string());
    }
    let mut seen_ids = HashSet::new();
    for (idx, item) in items.iter().enumerate() {
        validate_rule(item, idx + 1, &mut seen_ids, &mut report);
    }
    report
}

fn id_prefix(id: &str) -> Option<&str> {
    id.split_once('-').map(|(prefix, _)| prefix)
}

fn validate_rule(item: &Value, pos: usize, seen_ids: &mut HashSet<String>, report: &mut ValidationReport) {
    let Some(rule) = item.as_object() else {
        report.errors.push(format!("rule #{pos}: must be an object"));
        return;
    };

    let id = match rule.get("id") {
        None => {
            report.errors.push(format!("rule #{pos}: missing 'id'"));
            None
        }
        Some(Value::String(id)) => {
            if !seen_ids.insert(id.clone()) {
                report
                    .errors
                    .push(format!("rule #{pos}: duplicate id '{id}'"));
            }
            let prefix = id_prefix(id).unwrap_or("");
            if !VALID_ID_PREFIXES.contains(&prefix) {
                report.warnings.push(format!(
                    "rule #{pos}: id '{id}' uses non-standard prefix '{prefix}'"
                ));
            }
            Some(id.as_str())
        }
        Some(_) => {
            report
                .errors
                .push(format!("rule #{pos}: 'id' must be a string"));
            None
        }
    };

    match rule.get("content") {
        None => report
            .errors
            .push(format!("rule #{pos}: missing 'content'")),
        Some(Value::String(content)) if content.trim().is_empty() => report
            .errors
            .push(format!("rule #{pos}: 'content' must not be blank")),
        Some(Value::String(_)) => {}
        Some(_) => report
            .errors
            .push(format!("rule #{pos}: 'content' must be a string")),
    }

    let category = match rule.get("category") {
        None => {
            report
                .errors
                .push(format!("rule #{pos}: missing 'category'"));
            None
        }
        Some(Value::String(category)) if VALID_CATEGORIES.contains(&category.as_str()) => {
            Some(category.as_str())
        }
        Some(other) => {
            report
                .errors
                .push(format!("rule #{pos}: invalid category {other}"));
            None
        }
    };

    if let (Some(id), Some(category)) = (id, category) {
        check_prefix_category(id, category, pos, report);
    }

    if let Some(tags) = rule.get("tags") {
        if !tags.is_array() {
            report
                .warnings
                .push(format!("rule #{pos}: 'tags' should be an array"));
        }
    }
}

fn check_prefix_category(id: &str, category: &str, pos: usize, report: &mut ValidationReport) {
    let Some(prefix) = id_prefix(id) else {
        return;
    };
    let expected = PREFIX_CATEGORIES
        .iter()
        .find(|(known, _)| *known == prefix)
        .map(|(_, category)| *category);
    if let Some(expected) = expected {
        if expected != category {
            report.warnings.push(format!(
                "rule #{pos}: id '{id}' with prefix '{prefix}' suggests category '{expected}', found '{category}'"
            ));
        }
    }
}
