use crate::RuleEntry;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub rule_id: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub timestamp: String,
    #[serde(default)]
    pub client_id: String,
}

impl HistoryRecord {
    pub fn from_entry(id: i64, entry: &RuleEntry, at: DateTime<Utc>, client_id: &str) -> Self {
        Self {
            id,
            rule_id: entry.id.clone(),
            content: entry.content.clone(),
            category: entry.category.clone(),
            timestamp: format_timestamp(at),
            client_id: client_id.to_string(),
        }
    }
}

/// ISO-8601 UTC with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryStats {
    pub today_count: usize,
    pub by_category: BTreeMap<String, usize>,
    pub top_category: Option<String>,
    pub top_pct: u32,
}

pub fn compute_stats(records: &[HistoryRecord], today: NaiveDate) -> HistoryStats {
    let today_prefix = today.format("%Y-%m-%d").to_string();
    let mut today_count = 0;
    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for record in records {
        if record.timestamp.starts_with(&today_prefix) {
            today_count += 1;
        }
        if record.category.is_empty() {
            continue;
        }
        *by_category.entry(record.category.clone()).or_insert(0) += 1;
        if !first_seen.contains(&record.category.as_str()) {
            first_seen.push(record.category.as_str());
        }
    }

    let total: usize = by_category.values().sum();
    let mut top: Option<(&str, usize)> = None;
    for category in first_seen {
        let count = by_category[category];
        // strict comparison keeps the earliest category on ties
        if top.map_or(true, |(_, best)| count > best) {
            top = Some((category, count));
        }
    }
    let (top_category, top_pct) = match top {
        Some((category, count)) if total > 0 => {
            let pct = (count as f64 / total as f64 * 100.0).round() as u32;
            (Some(category.to_string()), pct)
        }
        _ => (None, 0),
    };

    HistoryStats {
        today_count,
        by_category,
        top_category,
        top_pct,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    /// Explicit ids were removed.
    Deleted { count: usize },
    /// No ids were given; the newest record was removed.
    Removed(HistoryRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Connected,
    LocalFallback,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected to remote"),
            Self::LocalFallback => write!(f, "using local fallback"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history backend unavailable: {0}")]
    Unavailable(String),
    #[error("add was acknowledged without a record")]
    AmbiguousWrite,
    #[error("no record to undo")]
    NoRecord,
    #[error("rule is missing id or content")]
    MissingFields,
    #[error("history backend rejected request: {0}")]
    Rejected(String),
    #[error("history storage error: {0}")]
    Storage(String),
}

/// Record log consumed by [`crate::DrawSession`].
pub trait HistoryLog {
    fn add(&mut self, entry: &RuleEntry) -> Result<HistoryRecord, HistoryError>;

    /// Newest first.
    fn list(&mut self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Rule ids of the newest `limit` records, newest first.
    fn recent(&mut self, limit: usize) -> Result<Vec<String>, HistoryError>;

    /// Removes exactly `ids`, or the newest record when `ids` is empty.
    fn undo(&mut self, ids: &[i64]) -> Result<UndoOutcome, HistoryError>;

    fn stats(&mut self) -> Result<HistoryStats, HistoryError>;

    /// Backend that served the latest operation, `None` before the first one.
    fn status(&self) -> Option<BackendStatus>;
}
