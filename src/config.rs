//! Configuration for dashboards and the HTTP backend.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::guard::CoalescePolicy;

/// Behaviour shared by every dashboard mounted through a hub.
///
/// All fields have sensible defaults accessible via [`SyncConfig::default()`].
///
/// # Examples
///
/// ```
/// use crowdfund_sync::{CoalescePolicy, SyncConfig};
///
/// let config = SyncConfig {
///     coalesce: CoalescePolicy::Drop,
///     ..SyncConfig::default()
/// };
/// assert!(config.patch_reconcile);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// What happens to refresh triggers that arrive while a fetch is in
    /// flight.
    ///
    /// Default: [`CoalescePolicy::FollowUp`].
    pub coalesce: CoalescePolicy,

    /// Whether an optimistic patch schedules a background refetch to
    /// reconcile it with the server.
    ///
    /// With this off, tentative values stay until the next refetch that
    /// some other trigger causes.
    ///
    /// Default: `true`.
    pub patch_reconcile: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            coalesce: CoalescePolicy::FollowUp,
            patch_reconcile: true,
        }
    }
}

/// Default base URL when `CROWDFUND_API_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api";

/// Default request timeout when `CROWDFUND_API_TIMEOUT_MS` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`HttpBackend`](crate::HttpBackend).
///
/// The bearer token is shared and refreshable: writing a new value into
/// [`token`](ApiConfig::token) takes effect on the next request. An empty
/// token means no `Authorization` header is sent.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Root URL every endpoint path is appended to.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Shared bearer token.
    pub token: Arc<RwLock<String>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ApiConfig {
    /// Config for `base_url` with the default timeout and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            token: Arc::new(RwLock::new(String::new())),
        }
    }

    /// Set the initial bearer token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        {
            let mut slot = self
                .token
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *slot = token.into();
        }
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a config from `CROWDFUND_API_URL`, `CROWDFUND_API_TOKEN` and
    /// `CROWDFUND_API_TIMEOUT_MS`, falling back to the defaults for unset
    /// variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    ///
    /// A timeout that does not parse as milliseconds is ignored with a
    /// warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("CROWDFUND_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(base_url);

        if let Some(token) = lookup("CROWDFUND_API_TOKEN") {
            config = config.with_token(token);
        }
        if let Some(raw) = lookup("CROWDFUND_API_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Duration::from_millis(ms),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "ignoring invalid CROWDFUND_API_TIMEOUT_MS");
                }
            }
        }
        config
    }
}
