use crate::accumulator::DEFAULT_DEBOUNCE;
use crate::sse_stream::DEFAULT_MAX_BUFFER;
use crate::Error;
use std::env;
use std::time::Duration;

/// Settings shared by the generation client, sessions and the job runner.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the generation API, e.g. `https://host/bot5/api/v1`.
    pub base_url: String,
    /// Whole-request timeout. Generation is slow, so this is generous.
    pub request_timeout: Duration,
    /// Quiet period before a projection is recomputed.
    pub debounce: Duration,
    /// Cap on buffered bytes of an unterminated SSE frame.
    pub max_buffer_bytes: usize,
    /// How long finished jobs are kept before eviction.
    pub job_ttl: Duration,
    /// How often the job cleanup task runs.
    pub cleanup_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            request_timeout: Duration::from_secs(10 * 60),
            debounce: DEFAULT_DEBOUNCE,
            max_buffer_bytes: DEFAULT_MAX_BUFFER,
            job_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at the given base URL, defaults elsewhere.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_job_ttl(mut self, ttl: Duration) -> Self {
        self.job_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// `TEACHKIT_BASE_URL` is required; `TEACHKIT_TIMEOUT_SECS`,
    /// `TEACHKIT_DEBOUNCE_MS`, `TEACHKIT_MAX_BUFFER_BYTES`,
    /// `TEACHKIT_JOB_TTL_SECS` and `TEACHKIT_CLEANUP_INTERVAL_SECS` override
    /// the defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from any variable source, named as in
    /// [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base_url = lookup("TEACHKIT_BASE_URL").ok_or_else(|| {
            Error::config("TEACHKIT_BASE_URL environment variable is required")
        })?;
        let number = |name: &str| parse_number(name, lookup(name));
        let defaults = Self::default();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: number("TEACHKIT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            debounce: number("TEACHKIT_DEBOUNCE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            max_buffer_bytes: number("TEACHKIT_MAX_BUFFER_BYTES")?
                .map(|bytes| bytes as usize)
                .unwrap_or(defaults.max_buffer_bytes),
            job_ttl: number("TEACHKIT_JOB_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_ttl),
            cleanup_interval: number("TEACHKIT_CLEANUP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
        })
    }

    /// URL of a path under the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_number(name: &str, raw: Option<String>) -> Result<Option<u64>, Error> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} must be a non-negative integer, got '{raw}'"))),
        None => Ok(None),
    }
}
