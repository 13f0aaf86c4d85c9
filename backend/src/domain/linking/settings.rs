//! Linking configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use super::token::{DEFAULT_TTL_DAYS, MAX_TTL_DAYS};

const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 3600;
const DEFAULT_APP_NAME: &str = "tandem";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Runtime settings for invitations, rooms and the HTTP listener.
///
/// Each value can come from CLI flags, `TANDEM_*` environment variables or a
/// configuration file.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "TANDEM")]
pub struct TandemSettings {
    /// Days before an invitation token expires.
    pub invitation_ttl_days: Option<i64>,
    /// Days before a room invite code expires.
    pub room_invite_ttl_days: Option<i64>,
    /// Seconds between expiry sweeps.
    pub expiry_sweep_secs: Option<u64>,
    /// Relay endpoint for invitation notices; logs them when unset.
    pub notifier_url: Option<String>,
    /// Product name rejected inside passwords.
    pub app_name: Option<String>,
    /// Socket address for the HTTP server.
    pub bind_addr: Option<String>,
    /// PostgreSQL connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    pub db_pool_max_size: Option<u32>,
}

impl TandemSettings {
    /// Invitation lifetime in days, at most [`MAX_TTL_DAYS`].
    #[must_use]
    pub fn invitation_ttl_days(&self) -> i64 {
        ttl_days(self.invitation_ttl_days)
    }

    /// Room invite lifetime in days, at most [`MAX_TTL_DAYS`].
    #[must_use]
    pub fn room_invite_ttl_days(&self) -> i64 {
        ttl_days(self.room_invite_ttl_days)
    }

    /// Interval between expiry sweeps.
    #[must_use]
    pub fn expiry_sweep_interval(&self) -> Duration {
        let secs = self
            .expiry_sweep_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRY_SWEEP_SECS);
        Duration::from_secs(secs)
    }

    /// Trimmed notifier URL, if any.
    #[must_use]
    pub fn notifier_url(&self) -> Option<&str> {
        self.notifier_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Application name used by the password policy.
    #[must_use]
    pub fn app_name(&self) -> &str {
        self.app_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_APP_NAME)
    }

    /// HTTP bind address.
    #[must_use]
    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    /// Database URL, if configured and not blank.
    #[must_use]
    pub fn database_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

fn ttl_days(value: Option<i64>) -> i64 {
    value
        .filter(|days| *days > 0)
        .map_or(DEFAULT_TTL_DAYS, |days| days.min(MAX_TTL_DAYS))
}
