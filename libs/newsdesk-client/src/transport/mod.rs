//! Network transports.
//!
//! Both transports expose the same seam ([`Transport`]) and the same boxed
//! response body, so the facade and retry layers never care which one
//! performed the call.

mod internal;

pub use internal::{SecureInternalTransport, is_private_host};

use crate::error::ApiError;
use crate::response::ResponseBody;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;

/// A single-request network transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP exchange.
    ///
    /// # Errors
    ///
    /// Connection, TLS, and IO failures surface as [`ApiError::Transport`];
    /// a received response of any status is returned as `Ok`.
    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<ResponseBody>, ApiError>;
}

/// Crypto provider for TLS connections.
///
/// Uses the globally installed default when one exists, otherwise a fresh
/// aws-lc-rs provider without mutating global state.
pub(crate) fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// The default transport: pooled hyper client with full certificate
/// verification against the webpki roots.
///
/// Used from the browser context and for any server-side call that does not
/// qualify for the internal transport. Plain HTTP is accepted so internal
/// plain-HTTP bases and local mock servers work; public bases are HTTPS.
#[derive(Clone)]
pub struct StandardTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl StandardTransport {
    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Tls`] if TLS initialization fails.
    pub fn new() -> Result<Self, ApiError> {
        let provider = get_crypto_provider();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| ApiError::Tls(Box::new(e)))?
            .https_or_http()
            .enable_all_versions()
            .build();

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .http2_only(false);

        Ok(Self {
            client: builder.build::<_, Full<Bytes>>(https),
        })
    }
}

#[async_trait]
impl Transport for StandardTransport {
    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<ResponseBody>, ApiError> {
        let response = self.client.request(req).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.map_err(Into::into).boxed()))
    }
}
