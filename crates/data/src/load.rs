use crate::schema::{AppConfig, RuleCatalog, RuleEntry};
use crate::validate::{validate_rules, ValidationReport};
use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const RULES_ENV: &str = "RULEDRAW_RULES";
pub const STATE_ENV: &str = "RULEDRAW_STATE";
pub const API_BASE_ENV: &str = "RULEDRAW_API_BASE";
pub const LANG_ENV: &str = "RULEDRAW_LANG";

fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(value)
}

/// Validates raw rule data and converts it into a catalog. Validation errors
/// abort; warnings are logged.
pub fn rules_from_value(data: Value) -> anyhow::Result<RuleCatalog> {
    let report = validate_rules(&data);
    if !report.is_valid() {
        bail!("invalid rule data\n{}", report.render());
    }
    for warning in &report.warnings {
        warn!("{warning}");
    }
    let entries: Vec<RuleEntry> = serde_json::from_value(data).context("decode rules")?;
    Ok(RuleCatalog::new(entries))
}

pub fn load_rules(path: &Path) -> anyhow::Result<RuleCatalog> {
    let data: Value = load_json(path)?;
    let catalog = rules_from_value(data).with_context(|| format!("load {}", path.display()))?;
    debug!(count = catalog.len(), path = %path.display(), "rules loaded");
    Ok(catalog)
}

pub fn validate_rules_file(path: &Path) -> anyhow::Result<ValidationReport> {
    let data: Value = load_json(path)?;
    Ok(validate_rules(&data))
}

/// Reads the config file if it exists, otherwise returns defaults.
pub fn load_app_config(path: &Path) -> anyhow::Result<AppConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    load_json(path)
}

pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    if let Some(path) = lookup(RULES_ENV) {
        config.rules_path = PathBuf::from(path);
    }
    if let Some(path) = lookup(STATE_ENV) {
        config.state_path = Some(PathBuf::from(path));
    }
    if let Some(base) = lookup(API_BASE_ENV) {
        config.api_base = Some(base);
    }
    if let Some(locale) = lookup(LANG_ENV) {
        config.locale = Some(locale);
    }
}

pub fn default_state_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(STATE_ENV) {
        return Some(PathBuf::from(path));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ruledraw_state.json"))
}

/// Maps loose locale spellings onto the two supported codes.
pub fn normalize_locale(locale: Option<&str>) -> &'static str {
    let raw = locale.unwrap_or_default().trim().replace('-', "_").to_ascii_lowercase();
    match raw.as_str() {
        "zh" | "zh_cn" | "zh_hans" | "zh_hans_cn" => "zh_CN",
        _ => "en_US",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_file(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "ruledraw_data_{tag}_{}_{}.json",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn rules_from_value_builds_catalog() {
        let catalog = rules_from_value(json!([
            {"id": "TAC-01", "content": "Rush", "category": "tactical"},
            {"id": "SOC-01", "content": "Callouts in rhyme", "category": "social", "tags": []}
        ]))
        .expect("catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.filter("social")[0].id, "SOC-01");
    }

    #[test]
    fn rules_from_value_rejects_errors() {
        let err = rules_from_value(json!([{"id": "TAC-01", "category": "tactical"}]))
            .expect_err("missing content");
        assert!(err.to_string().contains("missing 'content'"));
    }

    #[test]
    fn load_rules_from_file() {
        let file = unique_temp_file("rules");
        std::fs::write(
            &file,
            r#"[{"id":"WEP-01","content":"Pistols only","category":"weaponry"}]"#,
        )
        .expect("write");
        let catalog = load_rules(&file).expect("load");
        assert_eq!(catalog.entries()[0].content, "Pistols only");
        let report = validate_rules_file(&file).expect("validate");
        assert!(report.is_valid());
        let _ = std::fs::remove_file(file);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_app_config(&unique_temp_file("missing")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.recent_window, 10);
        assert_eq!(config.list_limit, 20);
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let file = unique_temp_file("config");
        std::fs::write(&file, r#"{"api_base":"http://localhost:8502","list_limit":5}"#)
            .expect("write");
        let config = load_app_config(&file).expect("config");
        assert_eq!(config.api_base.as_deref(), Some("http://localhost:8502"));
        assert_eq!(config.list_limit, 5);
        assert_eq!(config.recent_window, 10);
        assert_eq!(config.rules_path, PathBuf::from("assets/rules.json"));
        let _ = std::fs::remove_file(file);
    }

    #[test]
    fn env_overrides_replace_config_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (API_BASE_ENV, "http://127.0.0.1:9000"),
            (STATE_ENV, "/tmp/state.json"),
            (LANG_ENV, " "),
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/state.json")));
        assert_eq!(config.locale, None);
    }

    #[test]
    fn locale_spellings() {
        assert_eq!(normalize_locale(Some("zh-Hans")), "zh_CN");
        assert_eq!(normalize_locale(Some(" zh ")), "zh_CN");
        assert_eq!(normalize_locale(Some("en")), "en_US");
        assert_eq!(normalize_locale(Some("fr_FR")), "en_US");
        assert_eq!(normalize_locale(None), "en_US");
    }
}
