use serde::{Deserialize, Serialize};

/// Category filter value that disables filtering.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleEntry {
    pub id: String,
    pub content: String,
    pub category: String,
}

impl RuleEntry {
    pub fn new(id: &str, content: &str, category: &str) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
            category: category.to_string(),
        }
    }
}

pub fn filter_by_category(pool: &[RuleEntry], category: &str) -> Vec<RuleEntry> {
    if category == ALL_CATEGORIES {
        return pool.to_vec();
    }
    pool.iter()
        .filter(|entry| entry.category == category)
        .cloned()
        .collect()
}

/// Immutable rule list loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    entries: Vec<RuleEntry>,
}

impl RuleCatalog {
    pub fn new(entries: Vec<RuleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RuleEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn filter(&self, category: &str) -> Vec<RuleEntry> {
        filter_by_category(&self.entries, category)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.category.as_str()) {
                seen.push(entry.category.as_str());
            }
        }
        seen
    }
}
