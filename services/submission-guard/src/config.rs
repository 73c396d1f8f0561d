// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the submission guard service.
//!
//! Built once at startup and handed to the guard, the mailer and the
//! handlers. Nothing below the binary reads the environment directly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration for the submission guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origin and rate limiting configuration
    #[serde(default)]
    pub guard: GuardConfig,

    /// Outbound mail configuration
    pub mail: MailConfig,

    /// Upload and body limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Origin allow-list and submission ceilings.
///
/// `None` means "not configured"; the guard treats an unconfigured check as
/// open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Exact origins (`scheme://host[:port]`) allowed to submit
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,

    /// Maximum accepted submissions per identity in a trailing hour
    #[serde(default)]
    pub max_per_hour: Option<u32>,

    /// Maximum accepted submissions per identity in a trailing day
    #[serde(default)]
    pub max_per_day: Option<u32>,

    /// Submission log location (default: logs/submissions.log)
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Days a record is kept before pruning (default: 7)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Honour X-Forwarded-For / X-Real-IP / Client-IP (default: true)
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
}

/// SMTP transport and message identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// 587 = STARTTLS
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_user: String,

    #[serde(skip_serializing)]
    pub smtp_pass: String,

    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,

    /// Sender address; Gmail requires this to match `smtp_user`
    pub from_email: String,
    pub from_name: String,

    /// Inbox that receives form submissions
    pub to_email: String,
    pub to_name: String,

    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    #[serde(default = "default_site_name")]
    pub site_name: String,

    #[serde(default = "default_business_phone")]
    pub business_phone: String,

    #[serde(default = "default_business_address")]
    pub business_address: String,
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body (default: 10 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Largest shop photo that will be attached (default: 8 MiB)
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("logs/submissions.log")
}

fn default_retention_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout_secs() -> u64 {
    20
}

fn default_brand_name() -> String {
    "Super Distribution".to_string()
}

fn default_site_name() -> String {
    "superdistribution.mu".to_string()
}

fn default_business_phone() -> String {
    "+230 5234 5678".to_string()
}

fn default_business_address() -> String {
    "Port Louis, Mauritius".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_attachment_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            allowed_origins: None,
            max_per_hour: None,
            max_per_day: None,
            log_path: default_log_path(),
            retention_days: default_retention_days(),
            trust_forwarded_headers: default_true(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl GuardConfig {
    /// Hourly and daily ceilings, only when both are configured.
    pub fn ceilings(&self) -> Option<(u32, u32)> {
        match (self.max_per_hour, self.max_per_day) {
            (Some(hour), Some(day)) => Some((hour, day)),
            _ => None,
        }
    }

    /// Retention window in seconds.
    pub fn retention_secs(&self) -> i64 {
        i64::from(self.retention_days) * 86_400
    }
}

impl MailConfig {
    /// Bounded duration for one SMTP exchange.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let smtp_user = require("SMTP_USER")?;
        let from_email = get("MAIL_FROM").unwrap_or_else(|| smtp_user.clone());
        let from_name = get("MAIL_FROM_NAME").unwrap_or_else(|| format!("{} Website", default_brand_name()));

        let mail = MailConfig {
            smtp_host: get("SMTP_HOST").unwrap_or_else(default_smtp_host),
            smtp_port: parse_or(&get, "SMTP_PORT", default_smtp_port()),
            smtp_user,
            smtp_pass: require("SMTP_PASS")?,
            timeout_secs: parse_or(&get, "SMTP_TIMEOUT_SECS", default_smtp_timeout_secs()),
            from_email,
            from_name,
            to_email: require("MAIL_TO")?,
            to_name: get("MAIL_TO_NAME").unwrap_or_else(default_brand_name),
            brand_name: get("BRAND_NAME").unwrap_or_else(default_brand_name),
            site_name: get("SITE_NAME").unwrap_or_else(default_site_name),
            business_phone: get("BUSINESS_PHONE").unwrap_or_else(default_business_phone),
            business_address: get("BUSINESS_ADDRESS").unwrap_or_else(default_business_address),
        };

        let guard = GuardConfig {
            allowed_origins: get("ALLOWED_ORIGINS").map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            max_per_hour: parse_opt(&get, "MAX_SUBMISSIONS_PER_HOUR"),
            max_per_day: parse_opt(&get, "MAX_SUBMISSIONS_PER_DAY"),
            log_path: get("SUBMISSION_LOG").map(PathBuf::from).unwrap_or_else(default_log_path),
            retention_days: parse_or(&get, "LOG_RETENTION_DAYS", default_retention_days()),
            trust_forwarded_headers: parse_or(&get, "TRUST_FORWARDED_HEADERS", true),
        };

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or_else(default_bind_addr),
            guard,
            mail,
            limits: LimitsConfig {
                max_body_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", default_max_body_bytes()),
                ..Default::default()
            },
            metrics: MetricsConfig {
                enabled: parse_or(&get, "METRICS_ENABLED", true),
                ..Default::default()
            },
        })
    }
}

fn parse_opt<T, G>(get: &G, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    parse_opt(get, key).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const MAIL: &[(&str, &str)] = &[
        ("SMTP_USER", "sender@example.com"),
        ("SMTP_PASS", "app-password"),
        ("MAIL_TO", "orders@example.com"),
    ];

    #[test]
    fn test_minimal_config_is_open_mode() {
        let config = Config::from_lookup(lookup(MAIL)).unwrap();

        assert!(config.guard.allowed_origins.is_none());
        assert!(config.guard.ceilings().is_none());
        assert_eq!(config.mail.smtp_port, 587);
        assert_eq!(config.mail.from_email, "sender@example.com");
        assert_eq!(config.guard.retention_days, 7);
    }

    #[test]
    fn test_guard_settings_parsed() {
        let mut pairs = MAIL.to_vec();
        pairs.push(("ALLOWED_ORIGINS", "https://example.com, https://www.example.com,"));
        pairs.push(("MAX_SUBMISSIONS_PER_HOUR", "10"));
        pairs.push(("MAX_SUBMISSIONS_PER_DAY", "30"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(
            config.guard.allowed_origins.as_deref(),
            Some(&["https://example.com".to_string(), "https://www.example.com".to_string()][..])
        );
        assert_eq!(config.guard.ceilings(), Some((10, 30)));
    }

    #[test]
    fn test_single_ceiling_is_not_enforced() {
        let mut pairs = MAIL.to_vec();
        pairs.push(("MAX_SUBMISSIONS_PER_HOUR", "10"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.guard.ceilings().is_none());
    }

    #[test]
    fn test_bad_number_falls_back_to_default() {
        let mut pairs = MAIL.to_vec();
        pairs.push(("SMTP_PORT", "not-a-port"));

        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.mail.smtp_port, 587);
    }

    #[test]
    fn test_missing_inbox_is_an_error() {
        let err = Config::from_lookup(lookup(&MAIL[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MAIL_TO")));
    }
}
