use std::time::Duration;

/// Immutable endpoint configuration for one PowerDNS server. Outlives
/// the [`crate::client::PdnsClient`] built from it.
///
/// Grounded on `original_source/powerdns_migrator/config.py`'s
/// `PowerDNSConnection` dataclass; `url()` below is a direct port of
/// its `endpoint()` method.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub base_url: String,
    pub api_key: String,
    pub server_id: String,
    pub verify_ssl: bool,
}

impl ConnectionDescriptor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            server_id: "localhost".into(),
            verify_ssl: true,
        }
    }

    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Compose the endpoint URL for `path`, e.g. `/zones/example.com.`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/servers/{}{}",
            self.base_url.trim_end_matches('/'),
            self.server_id,
            path
        )
    }
}

/// Retry/backoff policy shared by a [`crate::client::PdnsClient`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(10.0),
            retries: 3,
            backoff: Duration::from_secs_f64(0.5),
            max_backoff: Duration::from_secs_f64(5.0),
            jitter: Duration::from_secs_f64(0.1),
        }
    }
}

/// Conflict-resolution and sanitization policy for the reconciliation
/// engine. Defaults match spec.md's described defaults (all policies
/// off unless a caller opts in).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnginePolicy {
    pub ignore_soa_serial: bool,
    pub auto_fix_cname_conflicts: bool,
    pub auto_fix_double_cname_conflicts: bool,
    pub normalize_txt_escapes: bool,
}

/// Per-zone execution mode, orthogonal to the conflict policy above.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationMode {
    pub recreate: bool,
    pub dry_run: bool,
}

/// What a worker should do when a zone fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Continue,
    Stop,
}

impl Default for OnError {
    fn default() -> Self {
        OnError::Continue
    }
}

/// Batch executor tuning (spec.md §4.3 / §6).
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub on_error: OnError,
    pub progress_interval: Duration,
    pub graceful_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            on_error: OnError::Continue,
            progress_interval: Duration::from_secs_f64(30.0),
            graceful_timeout: Duration::from_secs_f64(0.0),
        }
    }
}
