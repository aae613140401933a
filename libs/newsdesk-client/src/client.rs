use crate::cache::{CachedResponse, ResponseCache, cache_key};
use crate::config::ClientConfig;
use crate::context::{ExecutionContext, RoutePlan, TransportSelector};
use crate::credentials::{
    ClientStorage, CookieSink, CredentialStore, MemoryCookieSink, MemoryStorage, Navigator,
    NoopNavigator,
};
use crate::error::ApiError;
use crate::multipart::MultipartForm;
use crate::request::{
    ApiRequest, BodyKind, CacheMode, CountryRef, TENANT_STORAGE_KEY, TenantSelection, build_url,
};
use crate::response::{ApiResponse, RawResponse, read_body_limited, status_error};
use crate::retry::RetryExecutor;
use crate::transport::{SecureInternalTransport, StandardTransport, Transport, is_private_host};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::Full;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Builder for [`ApiClient`], allowing the storage, cookie, and navigation
/// seams to be replaced (server processes and tests use the in-memory
/// implementations).
#[must_use]
pub struct ApiClientBuilder {
    config: ClientConfig,
    storage: Arc<dyn ClientStorage>,
    cookies: Arc<dyn CookieSink>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            storage: Arc::new(MemoryStorage::new()),
            cookies: Arc::new(MemoryCookieSink::new()),
            navigator: Arc::new(NoopNavigator),
        }
    }

    /// Use the given durable client storage
    pub fn storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Use the given cookie sink
    pub fn cookies(mut self, cookies: Arc<dyn CookieSink>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Use the given navigator
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Tls`] if TLS initialization fails.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let selector = TransportSelector::new(&self.config);
        let cache = ResponseCache::new(self.config.cache_ttl, self.config.cache_capacity);
        let credentials = CredentialStore::new(self.storage.clone(), self.cookies);
        let retry = RetryExecutor::new(self.config.retry.clone());
        let standard = StandardTransport::new()?;

        // The verification-bypass transport only exists when explicitly
        // enabled; with the flag off it cannot be reached at all.
        let internal = if self.config.endpoints.allow_internal_tls_bypass {
            Some(SecureInternalTransport::new(
                self.config.endpoints.internal_host.clone(),
            )?)
        } else {
            None
        };

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                selector,
                cache,
                credentials,
                retry,
                standard,
                internal,
                storage: self.storage,
                navigator: self.navigator,
            }),
        })
    }
}

struct ClientInner {
    config: ClientConfig,
    selector: TransportSelector,
    cache: ResponseCache,
    credentials: CredentialStore,
    retry: RetryExecutor,
    standard: StandardTransport,
    internal: Option<SecureInternalTransport>,
    storage: Arc<dyn ClientStorage>,
    navigator: Arc<dyn Navigator>,
}

/// Verb-shaped facade over the backend API.
///
/// Composes transport selection, retrying execution, the browser response
/// cache, and the credential store. Cloning is cheap; the client is
/// `Send + Sync` and safe to share across tasks.
///
/// # Example
///
/// ```ignore
/// let client = ApiClient::new(ClientConfig::from_env())?;
///
/// let article: ApiResponse<Article> = client
///     .get(ExecutionContext::Browser, "/articles/:id")
///     .param("id", 5)
///     .send()
///     .await?;
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

/// A fully received response before envelope shaping
struct Outcome {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiClient {
    /// Create a client with in-memory storage/cookie/navigation seams.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Tls`] if TLS initialization fails.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        ApiClientBuilder::new(config).build()
    }

    /// Create a builder for customizing the client's seams
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// The credential store (login/logout flows call `set_token` here)
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Create a GET request builder
    pub fn get(&self, ctx: ExecutionContext, path: &str) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::GET, path)
    }

    /// Create a POST request builder
    pub fn post(&self, ctx: ExecutionContext, path: &str) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::POST, path)
    }

    /// Create a PUT request builder
    pub fn put(&self, ctx: ExecutionContext, path: &str) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::PUT, path)
    }

    /// Create a PATCH request builder
    pub fn patch(&self, ctx: ExecutionContext, path: &str) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::PATCH, path)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, ctx: ExecutionContext, path: &str) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::DELETE, path)
    }

    /// Create a multipart upload request builder (POST)
    pub fn upload(&self, ctx: ExecutionContext, path: &str, form: &MultipartForm) -> ApiRequest {
        ApiRequest::new(self.clone(), ctx, http::Method::POST, path).multipart(form)
    }

    pub(crate) async fn execute_enveloped<T: DeserializeOwned>(
        &self,
        req: ApiRequest,
    ) -> Result<ApiResponse<T>, ApiError> {
        let outcome = self.perform(&req, true).await?;
        Ok(ApiResponse::from_body(outcome.status, &outcome.body))
    }

    pub(crate) async fn execute_raw(&self, req: ApiRequest) -> Result<RawResponse, ApiError> {
        let outcome = self.perform(&req, false).await?;
        Ok(RawResponse::new(outcome.status, outcome.headers, outcome.body))
    }

    async fn perform(&self, req: &ApiRequest, cacheable: bool) -> Result<Outcome, ApiError> {
        let plan = self.inner.selector.route(req.ctx);
        let url = build_url(&plan.base_url, &req.path, &req.params)?;

        match self.dispatch(req, &plan, &url, cacheable).await {
            // Upload compatibility shim: one alternate-path attempt when the
            // primary 404s and the base carries the /api suffix.
            Err(err)
                if err.status() == Some(StatusCode::NOT_FOUND)
                    && matches!(req.body, BodyKind::Multipart { .. }) =>
            {
                let Some(stripped) = plan.base_url.strip_suffix("/api") else {
                    return Err(err);
                };
                tracing::debug!(
                    path = %req.path,
                    "upload target not found; retrying once against the bare base"
                );
                let url = build_url(stripped, &req.path, &req.params)?;
                self.dispatch(req, &plan, &url, cacheable).await
            }
            other => other,
        }
    }

    async fn dispatch(
        &self,
        req: &ApiRequest,
        plan: &RoutePlan,
        url: &url::Url,
        cacheable: bool,
    ) -> Result<Outcome, ApiError> {
        let is_get = req.method == http::Method::GET;
        let key = cache_key(&req.method, url);
        let cache_eligible = cacheable && is_get && plan.consult_cache;

        if cache_eligible && req.cache_mode == CacheMode::Default {
            if let Some(hit) = self.inner.cache.get(&key) {
                tracing::debug!(key = %key, "serving response from cache");
                return Ok(outcome_from_cached(hit));
            }
        }

        let headers = self.assemble_headers(req, plan)?;
        let timeout = req.timeout.unwrap_or(plan.timeout);
        let transport = self.select_transport(req.ctx, url);
        let max_body_size = self.inner.config.max_body_size;
        let body_bytes = match &req.body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Json(bytes) => bytes.clone(),
            BodyKind::Multipart { body, .. } => body.clone(),
        };
        let method = req.method.clone();

        let outcome = self
            .inner
            .retry
            .execute(timeout, |_attempt| {
                let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
                for (name, value) in &headers {
                    builder = builder.header(name.clone(), value.clone());
                }
                let request = builder.body(Full::new(body_bytes.clone()));

                async move {
                    let request = request.map_err(ApiError::from)?;
                    let response = transport.send(request).await?;
                    let (parts, body) = read_body_limited(response, max_body_size).await?;
                    Ok(Outcome {
                        status: parts.status,
                        headers: parts.headers,
                        body,
                    })
                }
            })
            .await?;

        if outcome.status.is_success() {
            if is_get {
                if cache_eligible && req.cache_mode != CacheMode::Bypass {
                    self.inner.cache.set(
                        &key,
                        CachedResponse {
                            status: outcome.status.as_u16(),
                            content_type: outcome
                                .headers
                                .get(http::header::CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok())
                                .map(ToOwned::to_owned),
                            body: outcome.body.clone(),
                        },
                    );
                }
            } else {
                // Coarse invalidation: any mutation may have touched anything
                self.inner.cache.clear();
            }
            return Ok(outcome);
        }

        let err = status_error(outcome.status, &outcome.body);
        if err.is_auth_failure() && req.ctx.is_browser() {
            let current_path = self.inner.navigator.current_path();
            if let Some(redirect) = self.inner.credentials.handle_auth_failure(
                current_path.as_deref(),
                &self.inner.config.protected_prefixes,
            ) {
                self.inner.navigator.redirect(&redirect);
            }
        }
        Err(err)
    }

    fn select_transport(&self, ctx: ExecutionContext, url: &url::Url) -> &dyn Transport {
        if ctx == ExecutionContext::Server {
            if let Some(internal) = &self.inner.internal {
                if url.host_str().is_some_and(is_private_host) {
                    tracing::trace!(url = %url, "dispatching via internal transport");
                    return internal;
                }
            }
        }
        &self.inner.standard
    }

    fn assemble_headers(
        &self,
        req: &ApiRequest,
        plan: &RoutePlan,
    ) -> Result<Vec<(http::header::HeaderName, http::HeaderValue)>, ApiError> {
        use http::HeaderValue;
        use http::header;

        let mut headers: Vec<(header::HeaderName, HeaderValue)> = vec![
            (header::ACCEPT, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static("x-requested-with"),
                HeaderValue::from_static("XMLHttpRequest"),
            ),
        ];

        headers.push((
            header::ACCEPT_LANGUAGE,
            HeaderValue::try_from(self.inner.config.locale.as_str())?,
        ));

        if let Some(key) = &self.inner.config.frontend_key {
            headers.push((
                header::HeaderName::from_static("x-frontend-key"),
                HeaderValue::try_from(key.as_str())?,
            ));
        }

        // GET carries no body and intentionally no content type
        match &req.body {
            BodyKind::Multipart { content_type, .. } => {
                headers.push((
                    header::CONTENT_TYPE,
                    HeaderValue::try_from(content_type.as_str())?,
                ));
            }
            BodyKind::Json(_) | BodyKind::Empty if req.method != http::Method::GET => {
                headers.push((
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                ));
            }
            BodyKind::Json(_) | BodyKind::Empty => {}
        }

        if let Some(country) = self.country_for(req) {
            if let Some(id) = country.id {
                headers.push((
                    header::HeaderName::from_static("x-country-id"),
                    HeaderValue::try_from(id.to_string())?,
                ));
            }
            if let Some(code) = &country.code {
                headers.push((
                    header::HeaderName::from_static("x-country-code"),
                    HeaderValue::try_from(code.as_str())?,
                ));
            }
        }

        let token = self.inner.credentials.token();
        if let Some(token) = &token {
            headers.push((
                header::AUTHORIZATION,
                HeaderValue::try_from(format!("Bearer {token}"))?,
            ));
        }

        if plan.include_credentials {
            if let Some(token) = &token {
                headers.push((
                    header::COOKIE,
                    HeaderValue::try_from(format!("token={token}"))?,
                ));
            }
        }

        if let Some(host) = &plan.host_override {
            headers.push((header::HOST, HeaderValue::try_from(host.as_str())?));
        }

        for (name, value) in &req.headers {
            headers.push((name.clone(), value.clone()));
        }

        Ok(headers)
    }

    /// Tenant country for the `X-Country-*` headers: explicit call parameter
    /// first, then (browser only) the persisted selection blob.
    fn country_for(&self, req: &ApiRequest) -> Option<CountryRef> {
        if let Some(country) = &req.country {
            return Some(country.clone());
        }
        if !req.ctx.is_browser() {
            return None;
        }
        let blob = self.inner.storage.get(TENANT_STORAGE_KEY)?;
        let tenant: TenantSelection = serde_json::from_str(&blob).ok()?;
        tenant.country
    }
}

fn outcome_from_cached(hit: CachedResponse) -> Outcome {
    let mut headers = HeaderMap::new();
    if let Some(ct) = hit
        .content_type
        .and_then(|v| http::HeaderValue::try_from(v).ok())
    {
        headers.insert(http::header::CONTENT_TYPE, ct);
    }
    Outcome {
        status: StatusCode::from_u16(hit.status).unwrap_or(StatusCode::OK),
        headers,
        body: hit.body,
    }
}
