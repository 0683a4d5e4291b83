//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::HubcastSettings;

/// `~/.hubcast/settings.json`
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hubcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubcastSettings> {
    let defaults = serde_json::to_value(HubcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HubcastSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Invalid values are ignored with a warning, falling back to file/default.
pub fn apply_env_overrides(settings: &mut HubcastSettings) {
    if let Some(v) = read_env_string("HUBCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u64("HUBCAST_PORT", 1, u64::from(u16::MAX)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = read_env_u64("HUBCAST_AUTH_TIMEOUT_MS", 100, 120_000) {
        settings.server.auth_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("HUBCAST_MAX_SEND_QUEUE", 1, 65_536) {
        settings.server.max_send_queue = usize::try_from(v).unwrap_or(settings.server.max_send_queue);
    }
    if let Some(v) = read_env_string("HUBCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("HUBCAST_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn validate(settings: &HubcastSettings) -> Result<()> {
    if !settings.server.path.starts_with('/') {
        return Err(SettingsError::InvalidValue(format!(
            "server.path must start with '/': {}",
            settings.server.path
        )));
    }
    if settings.server.max_send_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxSendQueue must be at least 1".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8184, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"roles": ["a", "b"]});
        let source = serde_json::json!({"roles": ["c"]});
        assert_eq!(deep_merge(target, source)["roles"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("8184", 1, 65_535), Some(8184));
        assert_eq!(parse_u64_range("0", 1, 65_535), None);
        assert_eq!(parse_u64_range("70000", 1, 65_535), None);
        assert_eq!(parse_u64_range("abc", 1, 65_535), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.server.path, "/websockets");
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"maxSendQueue":16}},"auth":{{"tokens":[{{"token":"t1","subject":"kiosk","roles":["userRead"]}}]}}}}"#
        )
        .unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.server.max_send_queue, 16);
        assert_eq!(settings.server.path, "/websockets");
        assert_eq!(settings.auth.tokens.len(), 1);
        assert_eq!(settings.auth.tokens[0].subject, "kiosk");
        assert_eq!(settings.auth.admit_roles.len(), 2);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn relative_path_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"path":"websockets"}}}}"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }
}
