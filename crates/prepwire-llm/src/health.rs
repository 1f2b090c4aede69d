//! Process-wide health beacon for the language-model provider.
//!
//! Readers never touch the network: the beacon only reflects outcomes
//! of real requests. Snapshots may be slightly stale under concurrent
//! updates, which callers tolerate.

use std::sync::Mutex;

use serde::Serialize;

/// Last-known reachability of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmStatus {
    Online,
    Offline,
    Unknown,
}

impl std::fmt::Display for LlmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Public snapshot of the beacon.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub configured: bool,
    pub status: LlmStatus,
    /// Unix timestamps (seconds).
    pub last_ok_at: Option<i64>,
    pub last_error_at: Option<i64>,
    pub last_error: Option<String>,
    pub model: String,
}

struct Inner {
    status: LlmStatus,
    last_ok_at: Option<i64>,
    last_error_at: Option<i64>,
    last_error: Option<String>,
}

/// Shared beacon — one per process, updated from any handler.
pub struct LlmHealth {
    configured: bool,
    model: String,
    inner: Mutex<Inner>,
}

impl LlmHealth {
    pub fn new(configured: bool, model: impl Into<String>) -> Self {
        Self {
            configured,
            model: model.into(),
            inner: Mutex::new(Inner {
                status: LlmStatus::Unknown,
                last_ok_at: None,
                last_error_at: None,
                last_error: None,
            }),
        }
    }

    pub fn configured(&self) -> bool {
        self.configured
    }

    pub fn status(&self) -> LlmStatus {
        self.inner.lock().unwrap().status
    }

    /// Record a successful attempt.
    pub fn record_ok(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = LlmStatus::Online;
        inner.last_ok_at = Some(chrono::Utc::now().timestamp());
    }

    /// Record a failed attempt with a short description.
    pub fn record_error(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.status = LlmStatus::Offline;
        inner.last_error_at = Some(chrono::Utc::now().timestamp());
        // Keep the beacon small; the full error goes to the log, not here.
        inner.last_error = Some(error.chars().take(200).collect());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.lock().unwrap();
        HealthSnapshot {
            configured: self.configured,
            status: inner.status,
            last_ok_at: inner.last_ok_at,
            last_error_at: inner.last_error_at,
            last_error: inner.last_error.clone(),
            model: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let health = LlmHealth::new(true, "claude-sonnet-4-6");
        let snap = health.snapshot();
        assert!(snap.configured);
        assert_eq!(snap.status, LlmStatus::Unknown);
        assert!(snap.last_ok_at.is_none());
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn records_outcomes() {
        let health = LlmHealth::new(true, "claude-sonnet-4-6");
        health.record_error("API error (503): overloaded");
        assert_eq!(health.status(), LlmStatus::Offline);
        assert!(health.snapshot().last_error_at.is_some());

        health.record_ok();
        let snap = health.snapshot();
        assert_eq!(snap.status, LlmStatus::Online);
        assert!(snap.last_ok_at.is_some());
        // The last error stays visible for diagnostics.
        assert!(snap.last_error.is_some());
    }

    #[test]
    fn long_errors_are_truncated() {
        let health = LlmHealth::new(false, "m");
        health.record_error(&"x".repeat(1000));
        assert_eq!(health.snapshot().last_error.unwrap().len(), 200);
    }
}
