// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Origin and submission-rate guard.
//!
//! Gates form submissions before any mail is sent:
//! 1. Origin allow-list (with a loopback escape hatch for development)
//! 2. Sliding-window ceilings per client identity (trailing hour and day)
//!
//! Missing configuration means "allow". Once configured, a violation is a
//! hard denial; nothing is queued or delayed.

use crate::config::GuardConfig;
use crate::store::{SubmissionRecord, SubmissionStore};
use axum::http::HeaderMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::{Host, Url};

pub const HOUR_SECS: i64 = 3_600;
pub const DAY_SECS: i64 = 86_400;

/// Identity-revealing headers, in priority order.
const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "client-ip"];

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Submission may proceed
    Allowed {
        /// Submissions left in the trailing hour, if limits are configured
        remaining: Option<u32>,
    },
    /// Submission is rate limited
    Limited {
        /// Which window is exhausted
        window: RateWindow,
        /// Time until one counted submission leaves that window
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Sliding windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    Hourly,
    Daily,
}

impl RateWindow {
    pub fn secs(self) -> i64 {
        match self {
            Self::Hourly => HOUR_SECS,
            Self::Daily => DAY_SECS,
        }
    }
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly submission limit exceeded"),
            Self::Daily => write!(f, "daily submission limit exceeded"),
        }
    }
}

/// Origin and rate guard over a shared record store.
pub struct Guard {
    config: GuardConfig,
    store: Arc<dyn SubmissionStore>,
}

impl Guard {
    /// Create a new guard with the given configuration and backing store.
    pub fn new(config: GuardConfig, store: Arc<dyn SubmissionStore>) -> Self {
        Self { config, store }
    }

    /// Whether a request from `origin` (Origin header, or Referer when no
    /// Origin was sent) addressed to `host` may submit.
    ///
    /// `scheme` is the scheme the request arrived on and is used to rebuild
    /// the current site URL.
    pub fn is_origin_allowed(&self, origin: Option<&str>, host: Option<&str>, scheme: &str) -> bool {
        let Some(allowed) = &self.config.allowed_origins else {
            return true;
        };
        let host = host.unwrap_or_default();
        let origin = origin.unwrap_or_default();

        debug!(origin, host, "Checking request origin");

        let current_url = format!("{scheme}://{host}");
        if allowed.iter().any(|o| *o == current_url) {
            return true;
        }
        if !origin.is_empty() && allowed.iter().any(|o| o == origin) {
            return true;
        }
        if is_loopback_host(host) {
            return true;
        }

        info!(origin, host, "Origin not in allow-list");
        false
    }

    /// Check the trailing-hour and trailing-day ceilings for `identity`.
    pub async fn check_rate(&self, identity: &str) -> RateDecision {
        self.check_rate_at(identity, now_secs()).await
    }

    /// [`Guard::check_rate`] against an explicit clock reading.
    ///
    /// A record counts toward a window only when its timestamp is strictly
    /// greater than `now - window`; a record exactly on the boundary second
    /// has already left the window.
    pub async fn check_rate_at(&self, identity: &str, now: i64) -> RateDecision {
        let Some((per_hour, per_day)) = self.config.ceilings() else {
            return RateDecision::Allowed { remaining: None };
        };

        let timestamps = match self.store.query_by_identity(identity).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, identity, "Could not read submission history, allowing");
                Vec::new()
            }
        };

        for (window, ceiling) in [(RateWindow::Hourly, per_hour), (RateWindow::Daily, per_day)] {
            let cutoff = now - window.secs();
            let mut counted: Vec<i64> = timestamps.iter().copied().filter(|t| *t > cutoff).collect();
            let count = counted.len();

            if count >= ceiling as usize {
                counted.sort_unstable();
                // Enough of the oldest records must age out to get back under the ceiling.
                let retry_after = counted
                    .get(count - ceiling as usize)
                    .map(|oldest| oldest.saturating_add(window.secs()).saturating_sub(now).max(1))
                    .unwrap_or(window.secs());
                debug!(identity, count, ceiling, %window, "Submission ceiling reached");
                return RateDecision::Limited {
                    window,
                    retry_after: Duration::from_secs(retry_after as u64),
                };
            }
        }

        let hourly = timestamps.iter().filter(|t| **t > now - HOUR_SECS).count() as u32;
        RateDecision::Allowed {
            remaining: Some(per_hour.saturating_sub(hourly)),
        }
    }

    /// Boolean form of [`Guard::check_rate`].
    pub async fn is_within_rate_limit(&self, identity: &str) -> bool {
        self.check_rate(identity).await.is_allowed()
    }

    /// Record an accepted submission and prune expired records.
    pub async fn record_submission(&self, identity: &str, email: &str) -> Result<(), crate::store::StoreError> {
        self.record_submission_at(identity, email, now_secs()).await
    }

    /// [`Guard::record_submission`] against an explicit clock reading.
    pub async fn record_submission_at(
        &self,
        identity: &str,
        email: &str,
        now: i64,
    ) -> Result<(), crate::store::StoreError> {
        let cutoff = now - self.config.retention_secs();
        let removed = self
            .store
            .append_and_prune(SubmissionRecord::new(now, identity, email), cutoff)
            .await?;
        debug!(identity, removed, "Submission recorded");
        Ok(())
    }

    /// Drop expired records without appending (periodic maintenance).
    pub async fn prune(&self) -> Result<usize, crate::store::StoreError> {
        self.store
            .prune_older_than(now_secs() - self.config.retention_secs())
            .await
    }

    /// Resolve the client identity for rate limiting.
    ///
    /// Forwarding headers are consulted first (when trusted), taking the
    /// first comma-separated token of the first header that yields a valid
    /// address. Falls back to the socket peer, then to loopback.
    pub fn resolve_client_identity(&self, headers: &HeaderMap, remote: Option<IpAddr>) -> String {
        if self.config.trust_forwarded_headers {
            if let Some(ip) = forwarded_client_ip(headers) {
                return ip.to_string();
            }
        }
        remote
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    FORWARDED_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        first.parse::<IpAddr>().ok()
    })
}

/// Whether a Host header value names a loopback or development host.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return false;
    }
    match Url::parse(&format!("http://{host}")).ok().and_then(|u| u.host().map(|h| h.to_owned())) {
        Some(Host::Domain(name)) => {
            let name = name.to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;

    fn guard_with(config: GuardConfig) -> (Guard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Guard::new(config, store.clone()), store)
    }

    fn limited(per_hour: u32, per_day: u32) -> GuardConfig {
        GuardConfig {
            max_per_hour: Some(per_hour),
            max_per_day: Some(per_day),
            ..Default::default()
        }
    }

    fn restricted() -> GuardConfig {
        GuardConfig {
            allowed_origins: Some(vec![
                "https://example.com".to_string(),
                "https://www.example.com".to_string(),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_mode_allows_any_origin() {
        let (guard, _) = guard_with(GuardConfig::default());
        assert!(guard.is_origin_allowed(Some("https://evil.test"), Some("evil.test"), "https"));
        assert!(guard.is_origin_allowed(None, None, "http"));
    }

    #[test]
    fn test_listed_origin_allowed() {
        let (guard, _) = guard_with(restricted());
        assert!(guard.is_origin_allowed(Some("https://www.example.com"), Some("api.example.net"), "https"));
    }

    #[test]
    fn test_current_url_allowed() {
        let (guard, _) = guard_with(restricted());
        assert!(guard.is_origin_allowed(None, Some("example.com"), "https"));
        assert!(!guard.is_origin_allowed(None, Some("example.com"), "http"));
    }

    #[test]
    fn test_origin_match_is_exact() {
        let (guard, _) = guard_with(restricted());
        assert!(!guard.is_origin_allowed(Some("https://example.com/"), Some("api.example.net"), "https"));
        assert!(!guard.is_origin_allowed(Some("https://example.com.evil.test"), Some("api.example.net"), "https"));
        assert!(!guard.is_origin_allowed(Some(""), Some("api.example.net"), "https"));
    }

    #[test]
    fn test_loopback_host_allowed() {
        let (guard, _) = guard_with(restricted());
        assert!(guard.is_origin_allowed(Some("https://evil.test"), Some("localhost:8080"), "http"));
        assert!(guard.is_origin_allowed(None, Some("127.0.0.1"), "http"));
        assert!(guard.is_origin_allowed(None, Some("[::1]:3000"), "http"));
    }

    #[test]
    fn test_is_loopback_host() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("app.localhost:5173"));
        assert!(is_loopback_host("127.0.0.2"));
        assert!(!is_loopback_host("localhost.evil.test"));
        assert!(!is_loopback_host("10.0.0.1"));
        assert!(!is_loopback_host(""));
    }

    #[tokio::test]
    async fn test_no_ceilings_always_allowed() {
        let (guard, store) = guard_with(GuardConfig {
            max_per_hour: Some(1),
            ..Default::default()
        });
        for _ in 0..5 {
            store.append(SubmissionRecord::new(1_000, "10.0.0.1", "")).await.unwrap();
        }
        assert!(guard.check_rate_at("10.0.0.1", 1_000).await.is_allowed());
    }

    #[tokio::test]
    async fn test_hourly_ceiling_and_boundary() {
        let (guard, _) = guard_with(limited(3, 100));
        let t0 = 1_700_000_000;

        for _ in 0..3 {
            assert!(guard.check_rate_at("10.0.0.1", t0).await.is_allowed());
            guard.record_submission_at("10.0.0.1", "a@b.com", t0).await.unwrap();
        }

        match guard.check_rate_at("10.0.0.1", t0 + HOUR_SECS - 1).await {
            RateDecision::Limited { window, retry_after } => {
                assert_eq!(window, RateWindow::Hourly);
                assert_eq!(retry_after, Duration::from_secs(1));
            }
            other => panic!("Should be limited, got {other:?}"),
        }

        // Records exactly one hour old no longer count.
        assert!(guard.check_rate_at("10.0.0.1", t0 + HOUR_SECS).await.is_allowed());

        assert!(guard.is_within_rate_limit("10.0.0.1").await);
        for _ in 0..3 {
            guard.record_submission("10.0.0.1", "a@b.com").await.unwrap();
        }
        assert!(!guard.is_within_rate_limit("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_far_future_timestamp_does_not_overflow() {
        let (guard, store) = guard_with(limited(1, 10));
        store.append(SubmissionRecord::new(i64::MAX, "10.0.0.1", "x")).await.unwrap();

        match guard.check_rate_at("10.0.0.1", 1_700_000_000).await {
            RateDecision::Limited { window, retry_after } => {
                assert_eq!(window, RateWindow::Hourly);
                assert!(retry_after.as_secs() > 0);
            }
            other => panic!("Should be limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_daily_ceiling() {
        let (guard, _) = guard_with(limited(10, 2));
        let t0 = 1_700_000_000;
        guard.record_submission_at("10.0.0.1", "", t0).await.unwrap();
        guard.record_submission_at("10.0.0.1", "", t0 + 2 * HOUR_SECS).await.unwrap();

        let decision = guard.check_rate_at("10.0.0.1", t0 + 5 * HOUR_SECS).await;
        assert_eq!(
            decision,
            RateDecision::Limited {
                window: RateWindow::Daily,
                retry_after: Duration::from_secs((DAY_SECS - 5 * HOUR_SECS) as u64),
            }
        );
        assert!(guard.check_rate_at("10.0.0.1", t0 + DAY_SECS).await.is_allowed());
    }

    #[tokio::test]
    async fn test_identities_counted_independently() {
        let (guard, _) = guard_with(limited(1, 10));
        guard.record_submission_at("10.0.0.1", "", 500).await.unwrap();

        assert!(!guard.check_rate_at("10.0.0.1", 600).await.is_allowed());
        assert_eq!(
            guard.check_rate_at("10.0.0.2", 600).await,
            RateDecision::Allowed { remaining: Some(1) }
        );
    }

    #[tokio::test]
    async fn test_record_prunes_after_retention() {
        let (guard, store) = guard_with(GuardConfig::default());
        let now = 1_700_000_000;
        store.append(SubmissionRecord::new(now - 7 * DAY_SECS, "old", "")).await.unwrap();
        store.append(SubmissionRecord::new(now - 7 * DAY_SECS + 1, "recent", "")).await.unwrap();

        guard.record_submission_at("fresh", "a@b.com", now).await.unwrap();

        let identities: Vec<String> = store
            .records()
            .await
            .into_iter()
            .map(|r| r.client_identity)
            .collect();
        assert_eq!(identities, vec!["recent", "fresh"]);
    }

    #[test]
    fn test_resolve_identity_priority() {
        let (guard, _) = guard_with(GuardConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        let remote = Some("192.0.2.1".parse().unwrap());
        assert_eq!(guard.resolve_client_identity(&headers, remote), "203.0.113.9");
    }

    #[test]
    fn test_resolve_identity_skips_invalid_header() {
        let (guard, _) = guard_with(GuardConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        headers.insert("client-ip", HeaderValue::from_static("2001:db8::7"));

        assert_eq!(guard.resolve_client_identity(&headers, None), "2001:db8::7");
    }

    #[test]
    fn test_resolve_identity_fallbacks() {
        let (guard, _) = guard_with(GuardConfig::default());
        let headers = HeaderMap::new();
        assert_eq!(
            guard.resolve_client_identity(&headers, Some("192.0.2.1".parse().unwrap())),
            "192.0.2.1"
        );
        assert_eq!(guard.resolve_client_identity(&headers, None), "127.0.0.1");
    }

    #[test]
    fn test_untrusted_forwarding_headers_ignored() {
        let (guard, _) = guard_with(GuardConfig {
            trust_forwarded_headers: false,
            ..Default::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(
            guard.resolve_client_identity(&headers, Some("192.0.2.1".parse().unwrap())),
            "192.0.2.1"
        );
    }
}
