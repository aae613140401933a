use crate::client::ApiClient;
use crate::context::ExecutionContext;
use crate::error::ApiError;
use crate::multipart::MultipartForm;
use crate::response::{ApiResponse, RawResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// Durable storage key for the persisted tenant selection JSON blob
pub const TENANT_STORAGE_KEY: &str = "tenant";

/// How a GET interacts with the response cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve from cache when fresh; store the response on success
    #[default]
    Default,
    /// Skip the cache entirely: no read, no write
    Bypass,
    /// Skip the cached value but store the fresh response
    Revalidate,
}

/// Multi-tenant country identifier carried as `X-Country-Id` /
/// `X-Country-Code` headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountryRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Persisted tenant selection, stored as a JSON blob under
/// [`TENANT_STORAGE_KEY`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantSelection {
    #[serde(default)]
    pub country: Option<CountryRef>,
}

/// Body attached to a request
#[derive(Debug, Clone)]
pub enum BodyKind {
    /// No body
    Empty,
    /// JSON-serialized payload (serialized at build time)
    Json(Bytes),
    /// Multipart form with its boundary-qualified content type
    Multipart { content_type: String, body: Bytes },
}

/// Build the final request URL: substitute `:name` / `{name}` placeholders
/// from the parameter map into the path, then append every unconsumed
/// parameter with a present value as a query pair.
///
/// A parameter consumed by a path segment never re-appears in the query
/// string. Parameters with absent values are omitted entirely.
///
/// # Errors
///
/// Returns [`ApiError::InvalidUrl`] when the base/path do not parse, or a
/// placeholder has no matching parameter (or an absent value).
pub fn build_url(
    base: &str,
    path: &str,
    params: &BTreeMap<String, Option<String>>,
) -> Result<url::Url, ApiError> {
    let mut consumed: Vec<&str> = Vec::new();
    let mut segments: Vec<String> = Vec::new();

    for segment in path.split('/') {
        let placeholder = segment
            .strip_prefix(':')
            .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')));

        match placeholder {
            Some(name) if !name.is_empty() => {
                let value = params.get(name).and_then(Option::as_deref).ok_or_else(|| {
                    ApiError::InvalidUrl {
                        url: format!("{base}{path}"),
                        reason: format!("no value for path parameter '{name}'"),
                    }
                })?;
                let key = params
                    .get_key_value(name)
                    .map(|(k, _)| k.as_str())
                    .unwrap_or(name);
                consumed.push(key);
                segments.push(urlencoding::encode(value).into_owned());
            }
            _ => segments.push(segment.to_owned()),
        }
    }

    let mut resolved = segments.join("/");
    if !resolved.starts_with('/') {
        resolved.insert(0, '/');
    }
    let joined = format!("{}{}", base.trim_end_matches('/'), resolved);
    let mut url = url::Url::parse(&joined).map_err(|e| ApiError::InvalidUrl {
        url: joined.clone(),
        reason: e.to_string(),
    })?;

    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            if consumed.contains(&name.as_str()) {
                continue;
            }
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// One API request under construction.
///
/// Created by the verb methods on [`ApiClient`]. Configure parameters,
/// headers, and body, then dispatch with [`send()`](ApiRequest::send) or
/// [`send_raw()`](ApiRequest::send_raw).
///
/// # Example
///
/// ```ignore
/// let article: ApiResponse<Article> = client
///     .get(ExecutionContext::Browser, "/articles/:id")
///     .param("id", 5)
///     .param("verbose", true)
///     .send()
///     .await?;
/// ```
#[must_use = "ApiRequest does nothing until .send() is called"]
pub struct ApiRequest {
    pub(crate) client: ApiClient,
    pub(crate) ctx: ExecutionContext,
    pub(crate) method: http::Method,
    pub(crate) path: String,
    pub(crate) params: BTreeMap<String, Option<String>>,
    pub(crate) headers: Vec<(http::header::HeaderName, http::header::HeaderValue)>,
    pub(crate) body: BodyKind,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cache_mode: CacheMode,
    pub(crate) country: Option<CountryRef>,
    /// Error captured during building (deferred to `send()`)
    pub(crate) error: Option<ApiError>,
}

impl ApiRequest {
    pub(crate) fn new(
        client: ApiClient,
        ctx: ExecutionContext,
        method: http::Method,
        path: &str,
    ) -> Self {
        Self {
            client,
            ctx,
            method,
            path: path.to_owned(),
            params: BTreeMap::new(),
            headers: Vec::new(),
            body: BodyKind::Empty,
            timeout: None,
            cache_mode: CacheMode::Default,
            country: None,
            error: None,
        }
    }

    /// Add a parameter. Consumed by a matching `:name` / `{name}` path
    /// placeholder, otherwise appended to the query string.
    pub fn param<V: ToString>(mut self, name: &str, value: V) -> Self {
        self.params.insert(name.to_owned(), Some(value.to_string()));
        self
    }

    /// Add an optional parameter; absent values are omitted from the query
    /// string entirely.
    pub fn param_opt<V: ToString>(mut self, name: &str, value: Option<V>) -> Self {
        self.params
            .insert(name.to_owned(), value.map(|v| v.to_string()));
        self
    }

    /// Add a request header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(ApiError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(ApiError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Set a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] if serialization fails.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let bytes = serde_json::to_vec(body)?;
        self.body = BodyKind::Json(Bytes::from(bytes));
        Ok(self)
    }

    /// Set a multipart form body
    pub fn multipart(mut self, form: &MultipartForm) -> Self {
        self.body = BodyKind::Multipart {
            content_type: form.content_type(),
            body: form.encode(),
        };
        self
    }

    /// Override the per-attempt timeout for this call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cache interaction mode (GET only; other verbs ignore it)
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Skip the response cache for this call (no read, no write)
    pub fn bypass_cache(self) -> Self {
        self.cache_mode(CacheMode::Bypass)
    }

    /// Explicit tenant country (server context, where no persisted
    /// selection exists)
    pub fn country(mut self, country: CountryRef) -> Self {
        self.country = Some(country);
        self
    }

    /// Dispatch and parse the response into the `{ data, status, success }`
    /// envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses, or the
    /// transport/timeout error once retries are exhausted.
    pub async fn send<T: DeserializeOwned>(mut self) -> Result<ApiResponse<T>, ApiError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let client = self.client.clone();
        client.execute_enveloped(self).await
    }

    /// Dispatch and return the raw response (status, headers, body readers).
    ///
    /// The response cache is not consulted on this path; mutations still
    /// invalidate it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] for non-2xx responses, or the
    /// transport/timeout error once retries are exhausted.
    pub async fn send_raw(mut self) -> Result<RawResponse, ApiError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let client = self.client.clone();
        client.execute_raw(self).await
    }
}
