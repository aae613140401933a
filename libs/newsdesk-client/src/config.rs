use std::time::Duration;

/// Default per-attempt timeout for browser-context calls (15 seconds)
pub const DEFAULT_BROWSER_TIMEOUT: Duration = Duration::from_secs(15);

/// Default per-attempt timeout for server-context calls (10 seconds)
///
/// Server-to-server calls target the internal address and are expected to be
/// fast; a tighter budget keeps render latency bounded.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default response-cache entry lifetime (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default response-cache capacity (most recent 100 entries)
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Retry policy: attempts beyond the first, base delay, and the additive
/// jitter cap applied to each backoff.
///
/// Delay before retry `n` (0-indexed) is `base_delay * 2^n + jitter` where
/// jitter is uniform in `0..jitter_cap`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 3,
    /// i.e. 4 total attempts)
    pub max_retries: usize,

    /// Base backoff delay (default: 1000ms)
    pub base_delay: Duration,

    /// Upper bound for the random additive jitter (default: 500ms).
    /// Zero disables jitter.
    pub jitter_cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            jitter_cap: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Create config with no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Create fast config for testing (1ms base delay, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            jitter_cap: Duration::ZERO,
        }
    }
}

/// Base addresses and internal-routing identity for the backend API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Public base URL, used from the browser context
    /// (e.g. `https://newsdesk.example/api`)
    pub public_base_url: String,

    /// Internal base URL, used from the server context for low-latency
    /// server-to-server calls (e.g. `https://10.0.1.20/api`)
    pub internal_base_url: String,

    /// Logical virtual-host name presented via SNI and the `Host` header when
    /// dialing the internal address (e.g. `newsdesk.example`)
    pub internal_host: String,

    /// Opt-in for the peer-verification bypass on internal calls.
    ///
    /// Must stay disabled unless the internal address presents a certificate
    /// issued for the public hostname. Even when enabled, the bypass only
    /// engages for loopback/private destination addresses; every other
    /// destination keeps full verification.
    pub allow_internal_tls_bypass: bool,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:8080/api".to_owned(),
            internal_base_url: "http://127.0.0.1:8080/api".to_owned(),
            internal_host: "localhost".to_owned(),
            allow_internal_tls_bypass: false,
        }
    }
}

/// Overall client configuration.
///
/// Constructed explicitly and handed to [`ApiClient`](crate::ApiClient);
/// there is no process-global client or ambient configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base addresses and internal-routing identity
    pub endpoints: Endpoints,

    /// Retry policy applied to transport failures and timeouts
    pub retry: RetryConfig,

    /// Per-attempt timeout for browser-context calls (default: 15s)
    pub browser_timeout: Duration,

    /// Per-attempt timeout for server-context calls (default: 10s)
    pub server_timeout: Duration,

    /// Maximum buffered response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// Locale sent as the `Accept-Language` marker (default: "en")
    pub locale: String,

    /// Frontend API key sent as `X-Frontend-Key` when present
    pub frontend_key: Option<String>,

    /// Path prefixes of the application's protected sections; an
    /// authentication failure on one of these triggers sign-out
    pub protected_prefixes: Vec<String>,

    /// Response-cache entry lifetime (default: 5 minutes)
    pub cache_ttl: Duration,

    /// Response-cache capacity (default: 100 entries)
    pub cache_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            retry: RetryConfig::default(),
            browser_timeout: DEFAULT_BROWSER_TIMEOUT,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            max_body_size: 10 * 1024 * 1024,
            locale: "en".to_owned(),
            frontend_key: None,
            protected_prefixes: vec!["/admin".to_owned()],
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Build configuration from the environment.
    ///
    /// Consumed variables, all optional (defaults apply when unset):
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `NEWSDESK_API_URL` | `endpoints.public_base_url` |
    /// | `NEWSDESK_INTERNAL_API_URL` | `endpoints.internal_base_url` |
    /// | `NEWSDESK_INTERNAL_HOST` | `endpoints.internal_host` |
    /// | `NEWSDESK_INTERNAL_TLS_BYPASS` | `endpoints.allow_internal_tls_bypass` (`1`/`true`) |
    /// | `NEWSDESK_FRONTEND_KEY` | `frontend_key` |
    /// | `NEWSDESK_LOCALE` | `locale` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NEWSDESK_API_URL") {
            config.endpoints.public_base_url = url;
        }
        if let Ok(url) = std::env::var("NEWSDESK_INTERNAL_API_URL") {
            config.endpoints.internal_base_url = url;
        }
        if let Ok(host) = std::env::var("NEWSDESK_INTERNAL_HOST") {
            config.endpoints.internal_host = host;
        }
        if let Ok(flag) = std::env::var("NEWSDESK_INTERNAL_TLS_BYPASS") {
            config.endpoints.allow_internal_tls_bypass =
                matches!(flag.trim(), "1" | "true" | "TRUE" | "True");
        }
        if let Ok(key) = std::env::var("NEWSDESK_FRONTEND_KEY") {
            if !key.is_empty() {
                config.frontend_key = Some(key);
            }
        }
        if let Ok(locale) = std::env::var("NEWSDESK_LOCALE") {
            config.locale = locale;
        }

        config
    }

    /// Create configuration for testing against local mock servers
    /// (fast retries, short timeouts).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            retry: RetryConfig::fast(),
            browser_timeout: Duration::from_secs(5),
            server_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }
}
