//! TOML-based application configuration.
//!
//! Stores operator preferences:
//! - Database location override
//! - Review permissions (admin-only review)
//! - Compliance classification keywords and alert thresholds
//! - Follow-up reminder offsets
//! - Webhook-relay transport credentials
//!
//! Configuration is stored at `~/.config/fleetcheck/config.toml`.
//! A handful of environment variables override the file for container
//! deployments.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;

/// Compliance classification and alerting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Width of the compliance window in hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    /// Substring-matched, non-punitive reason keywords.
    #[serde(default = "default_exception_keywords")]
    pub exception_keywords: Vec<String>,
    /// Channel-title tokens marking a channel out of rotation.
    #[serde(default = "default_pause_tokens")]
    pub pause_tokens: Vec<String>,
    /// Handle mentioned in supervisor escalations.
    #[serde(default = "default_fleet_mention")]
    pub fleet_mention: String,
    /// Consecutive non-compliant reports before the driver nudge.
    #[serde(default = "default_driver_alert_threshold")]
    pub driver_alert_threshold: i64,
    /// Consecutive non-compliant reports before the supervisor escalation.
    #[serde(default = "default_dispatch_alert_threshold")]
    pub dispatch_alert_threshold: i64,
}

/// Follow-up reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupConfig {
    /// Minutes after the notification at which each slot fires.
    #[serde(default = "default_followup_delays")]
    pub delays_min: Vec<u64>,
}

/// Webhook-relay transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/fleetcheck/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database file override; defaults to the data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Restrict review actions to group admins.
    #[serde(default)]
    pub admin_only_review: bool,
    /// Default digest time (HH:MM) applied to newly created groups.
    #[serde(default = "default_digest_time")]
    pub digest_time: String,
    #[serde(default)]
    pub compliance: ComplianceConfig,
    #[serde(default)]
    pub followup: FollowupConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

// Default functions
fn default_window_hours() -> i64 {
    24
}
fn default_exception_keywords() -> Vec<String> {
    [
        "trailer not ready",
        "dropped",
        "drop yard",
        "at shop",
        "shop",
        "in shop",
        "no trailer",
        "waiting on trailer",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
fn default_pause_tokens() -> Vec<String> {
    ["inactive", "home", "home time"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
fn default_fleet_mention() -> String {
    "@FleetOnDuty".to_string()
}
fn default_driver_alert_threshold() -> i64 {
    2
}
fn default_dispatch_alert_threshold() -> i64 {
    3
}
fn default_followup_delays() -> Vec<u64> {
    vec![15, 50]
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_digest_time() -> String {
    "10:30".to_string()
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            exception_keywords: default_exception_keywords(),
            pause_tokens: default_pause_tokens(),
            fleet_mention: default_fleet_mention(),
            driver_alert_threshold: default_driver_alert_threshold(),
            dispatch_alert_threshold: default_dispatch_alert_threshold(),
        }
    }
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            delays_min: default_followup_delays(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            admin_only_review: false,
            digest_time: default_digest_time(),
            compliance: ComplianceConfig::default(),
            followup: FollowupConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Parse an `HH:MM` local time.
pub fn parse_local_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::InvalidValue {
        key: "time".to_string(),
        message: format!("expected HH:MM, got '{value}'"),
    })
}

impl AppConfig {
    /// Load the configuration, apply environment overrides, and fall
    /// back to defaults when the file does not exist.
    ///
    /// # Errors
    /// Returns an error only when the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match data_dir() {
            Ok(dir) => dir.join("config.toml"),
            Err(_) => PathBuf::from("config.toml"),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Persist to the given path.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("FLEETCHECK_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(value) = std::env::var("FLEETCHECK_ADMIN_ONLY_REVIEW") {
            self.admin_only_review =
                matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Ok(value) = std::env::var("FLEETCHECK_DIGEST_TIME") {
            self.digest_time = value;
        }
        if let Ok(url) = std::env::var("FLEETCHECK_RELAY_URL") {
            self.transport.base_url = url;
        }
        if let Ok(token) = std::env::var("FLEETCHECK_RELAY_TOKEN") {
            self.transport.token = token;
        }
    }

    /// Parsed default digest time.
    ///
    /// # Errors
    /// Returns an error if the configured value is not `HH:MM`.
    pub fn digest_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_local_time(&self.digest_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_thresholds() {
        let config = AppConfig::default();
        assert_eq!(config.compliance.window_hours, 24);
        assert_eq!(config.compliance.driver_alert_threshold, 2);
        assert_eq!(config.compliance.dispatch_alert_threshold, 3);
        assert_eq!(config.followup.delays_min, vec![15, 50]);
        assert!(config
            .compliance
            .exception_keywords
            .iter()
            .any(|k| k == "no trailer"));
    }

    #[test]
    fn parse_local_time_accepts_hh_mm() {
        assert_eq!(
            parse_local_time("10:30").unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap()
        );
        assert!(parse_local_time("25:99").is_err());
        assert!(parse_local_time("morning").is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.admin_only_review = true;
        config.compliance.exception_keywords.push("yard move".to_string());
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert!(loaded.admin_only_review);
        assert!(loaded
            .compliance
            .exception_keywords
            .iter()
            .any(|k| k == "yard move"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = AppConfig::load_from(&PathBuf::from("/nonexistent/config.toml")).unwrap();
        assert_eq!(loaded.digest_time, "10:30");
    }
}
