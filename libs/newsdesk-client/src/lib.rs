//! HTTP access layer for the Newsdesk backend API.
//!
//! This crate is the one piece of the Newsdesk content-management
//! application that talks to the backend. It provides:
//! - Verb-shaped operations (`get`/`post`/`put`/`patch`/`delete`/`upload`)
//!   with path-template substitution and query encoding
//! - Dual execution contexts: server-rendering process vs browser session,
//!   selected per call with distinct base addresses and credential policies
//! - Timeout-bounded attempts with exponential-backoff retry for transport
//!   failures (received responses are definitive and never retried)
//! - A bounded, TTL-based response cache for browser-context GETs with
//!   whole-cache invalidation on any mutation
//! - Bearer-token lifecycle: durable storage + cookie mirroring, lazy
//!   hydration, and forced sign-out with a sanitized return path
//! - A socket-level internal transport that reaches the backend over its
//!   private address with TLS peer verification disabled for that connection
//!   only, while presenting the logical virtual-host identity via SNI and
//!   the `Host` header
//!
//! # Example
//!
//! ```ignore
//! use newsdesk_client::{ApiClient, ApiResponse, ClientConfig, ExecutionContext};
//!
//! let client = ApiClient::new(ClientConfig::from_env())?;
//!
//! let article: ApiResponse<Article> = client
//!     .get(ExecutionContext::Browser, "/articles/:id")
//!     .param("id", 5)
//!     .send()
//!     .await?;
//! ```

mod cache;
mod client;
mod config;
mod context;
mod credentials;
mod error;
mod multipart;
mod request;
mod response;
mod retry;
mod transport;

pub use cache::{CachedResponse, ResponseCache, cache_key};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{
    ClientConfig, DEFAULT_BROWSER_TIMEOUT, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL,
    DEFAULT_SERVER_TIMEOUT, Endpoints, RetryConfig,
};
pub use context::{ExecutionContext, RoutePlan, TransportSelector};
pub use credentials::{
    ClientStorage, CookieSink, CredentialStore, MemoryCookieSink, MemoryStorage, Navigator,
    NoopNavigator, RETURN_PATH_MAX_CHARS, SIGN_IN_PATH, TOKEN_COOKIE_MAX_AGE, TOKEN_COOKIE_NAME,
    TOKEN_STORAGE_KEY, sanitize_return_path, sign_in_redirect,
};
pub use error::{ApiError, ValidationErrors};
pub use multipart::MultipartForm;
pub use request::{
    ApiRequest, BodyKind, CacheMode, CountryRef, TENANT_STORAGE_KEY, TenantSelection, build_url,
};
pub use response::{ApiResponse, ERROR_BODY_PREVIEW_LIMIT, RawResponse, ResponseBody};
pub use retry::{RetryExecutor, backoff_delay};
pub use transport::{SecureInternalTransport, StandardTransport, Transport, is_private_host};
