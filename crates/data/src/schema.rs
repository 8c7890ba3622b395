use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use ruledraw_core::{RuleCatalog, RuleEntry};

pub const DEFAULT_RULES_PATH: &str = "assets/rules.json";

fn default_rules_path() -> PathBuf {
    PathBuf::from(DEFAULT_RULES_PATH)
}

fn default_recent_window() -> usize {
    10
}

fn default_list_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Base URL of the history service, e.g. `http://localhost:8502`.
    #[serde(default)]
    pub api_base: Option<String>,
    /// Overrides the loopback/private-network trust check for `api_base`.
    #[serde(default)]
    pub trust_remote: Option<bool>,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            state_path: None,
            api_base: None,
            trust_remote: None,
            recent_window: default_recent_window(),
            list_limit: default_list_limit(),
            locale: None,
        }
    }
}
