//! Configuration management
//!
//! settings.json in the data directory:
//! ```json
//! {
//!   "app": { "demoMode": false, "pollIntervalMs": 3000 },
//!   "supabase": { "url": "https://xyz.supabase.co", "anonKey": "..." }
//! }
//! ```
//! Fields this crate doesn't manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Session;

pub const ENV_SUPABASE_URL: &str = "TASKLIST_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "TASKLIST_SUPABASE_ANON_KEY";
pub const ENV_DEMO_MODE: &str = "TASKLIST_DEMO_MODE";

const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    supabase: SupabaseSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    poll_interval_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anon_key: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Effective configuration (settings file plus environment overrides)
#[derive(Debug, Clone)]
pub struct Config {
    pub demo_mode: bool,
    pub poll_interval: Duration,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo_mode: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            supabase_url: None,
            supabase_anon_key: None,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "TRUE" | "YES" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_settings(settings_path: &Path) -> Result<SettingsFile> {
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

impl Config {
    /// Load config from the data directory, applying `TASKLIST_*` overrides
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_with(dir, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with(dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(&dir.join("settings.json"))?;

        let demo_mode = env(ENV_DEMO_MODE)
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(raw.app.demo_mode);

        let poll_ms = raw
            .app
            .poll_interval_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Ok(Self {
            demo_mode,
            poll_interval: Duration::from_millis(poll_ms),
            supabase_url: non_empty(env(ENV_SUPABASE_URL)).or_else(|| non_empty(raw.supabase.url)),
            supabase_anon_key: non_empty(env(ENV_SUPABASE_ANON_KEY))
                .or_else(|| non_empty(raw.supabase.anon_key)),
        })
    }

    /// Write the managed fields back, keeping everything else in the file
    ///
    /// Only `app.demoMode` is written; connection settings are left as the
    /// user wrote them so an environment override never leaks into the file.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let settings_path = dir.join("settings.json");
        let mut settings = read_settings(&settings_path)?;
        settings.app.demo_mode = self.demo_mode;

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Project URL and anon key, or empty strings when unset
    ///
    /// Missing values are not an error here; the first request against them
    /// fails instead.
    pub fn supabase_endpoint(&self) -> (String, String) {
        (
            self.supabase_url.clone().unwrap_or_default(),
            self.supabase_anon_key.clone().unwrap_or_default(),
        )
    }

    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }
}

const SESSION_FILE: &str = "session.json";

/// Read the persisted sign-in session, if any
///
/// An unreadable file is treated as signed out.
pub fn load_session(dir: &Path) -> Result<Option<Session>> {
    let path = dir.join(SESSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content).ok())
}

/// Persist the session, or remove the file when signed out
pub fn save_session(dir: &Path, session: Option<&Session>) -> Result<()> {
    let path = dir.join(SESSION_FILE);
    match session {
        Some(session) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            std::fs::write(&path, serde_json::to_string_pretty(session)?)?;
        }
        None if path.exists() => std::fs::remove_file(&path)?,
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_with(dir.path(), no_env).unwrap();
        assert!(!config.demo_mode);
        assert_eq!(config.poll_interval, Duration::from_millis(3_000));
        assert_eq!(config.supabase_endpoint(), (String::new(), String::new()));
    }

    #[test]
    fn test_reads_settings_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app":{"demoMode":true,"pollIntervalMs":500},"supabase":{"url":"https://p.supabase.co","anonKey":"anon"}}"#,
        )
        .unwrap();

        let config = Config::load_with(dir.path(), no_env).unwrap();
        assert!(config.demo_mode);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.supabase_url.as_deref(), Some("https://p.supabase.co"));
        assert_eq!(config.supabase_anon_key.as_deref(), Some("anon"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app":{"demoMode":true},"supabase":{"url":"https://file.supabase.co"}}"#,
        )
        .unwrap();

        let config = Config::load_with(dir.path(), |key| match key {
            ENV_DEMO_MODE => Some("0".to_string()),
            ENV_SUPABASE_URL => Some("https://env.supabase.co".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(!config.demo_mode);
        assert_eq!(config.supabase_url.as_deref(), Some("https://env.supabase.co"));
    }

    #[test]
    fn test_save_preserves_unmanaged_fields() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app":{"demoMode":false,"theme":"dark"},"supabase":{"url":"https://p.supabase.co"},"extra":{"a":1}}"#,
        )
        .unwrap();

        let mut config = Config::load_with(dir.path(), no_env).unwrap();
        config.enable_demo_mode();
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("settings.json")).unwrap())
                .unwrap();
        assert_eq!(saved["app"]["demoMode"], true);
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["supabase"]["url"], "https://p.supabase.co");
        assert_eq!(saved["extra"]["a"], 1);
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        let config = Config::load_with(dir.path(), no_env).unwrap();
        assert!(!config.demo_mode);
    }

    #[test]
    fn test_session_file_round_trip() {
        let dir = tempdir().unwrap();
        assert!(load_session(dir.path()).unwrap().is_none());

        let session = Session {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: None,
            user: crate::domain::User::new("u1", "u1@example.com"),
        };
        save_session(dir.path(), Some(&session)).unwrap();
        assert_eq!(load_session(dir.path()).unwrap(), Some(session));

        save_session(dir.path(), None).unwrap();
        assert!(load_session(dir.path()).unwrap().is_none());
    }
}
