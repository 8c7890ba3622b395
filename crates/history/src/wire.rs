//! Request and response bodies of the history HTTP service.

use ruledraw_core::{HistoryRecord, HistoryStats};
use serde::{Deserialize, Serialize};

pub const LIST_PATH: &str = "/api/history/list";
pub const RECENT_PATH: &str = "/api/history/recent";
pub const STATS_PATH: &str = "/api/history/stats";
pub const ADD_PATH: &str = "/api/history/add";
pub const UNDO_PATH: &str = "/api/history/undo";
pub const HEALTH_PATH: &str = "/api/health";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub ok: bool,
    #[serde(default)]
    pub items: Vec<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentResponse {
    pub ok: bool,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub stats: HistoryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRequest {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddResponse {
    pub ok: bool,
    #[serde(default)]
    pub item: Option<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
