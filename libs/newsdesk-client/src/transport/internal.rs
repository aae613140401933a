use crate::error::ApiError;
use crate::response::ResponseBody;
use crate::transport::{Transport, get_crypto_provider};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::DigitallySignedStruct;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Whether a URL host is a loopback or private-range address.
///
/// IP literals (and the literal `localhost`) only; any other hostname fails
/// the gate, which keeps the verification-bypass transport impossible to
/// point at an external destination.
#[must_use]
pub fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

/// Certificate verifier that accepts any peer.
///
/// Lives only inside [`SecureInternalTransport`], which is gated to
/// loopback/private destinations behind an explicit configuration flag.
/// Every other connection the process makes keeps full verification.
#[derive(Debug)]
struct UnverifiedPeer {
    schemes: Vec<rustls::SignatureScheme>,
}

impl ServerCertVerifier for UnverifiedPeer {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.schemes.clone()
    }
}

/// Socket-level transport for reaching the backend over its internal
/// address.
///
/// The internal address presents a certificate issued for the public
/// hostname, so peer-name verification cannot succeed against the dialed
/// address. This transport disables peer verification for its own
/// connections while still presenting the logical virtual-host identity:
/// SNI carries the configured hostname so the reverse proxy in front of the
/// service routes correctly, and the `Host` header carries the same name for
/// HTTP-level virtual-host routing.
pub struct SecureInternalTransport {
    logical_host: String,
    tls_config: Arc<rustls::ClientConfig>,
}

impl SecureInternalTransport {
    /// Build the transport for the given logical virtual-host name.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Tls`] if the TLS client configuration cannot be
    /// built.
    pub fn new(logical_host: impl Into<String>) -> Result<Self, ApiError> {
        let logical_host = logical_host.into();
        let provider = get_crypto_provider();
        let schemes = provider
            .signature_verification_algorithms
            .supported_schemes();

        let tls_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ApiError::Tls(Box::new(e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(UnverifiedPeer { schemes }))
            .with_no_client_auth();

        tracing::warn!(
            host = %logical_host,
            "internal transport created: TLS peer verification is DISABLED for \
             loopback/private destinations dialed through it"
        );

        Ok(Self {
            logical_host,
            tls_config: Arc::new(tls_config),
        })
    }

    /// The logical virtual-host name presented via SNI and `Host`
    #[must_use]
    pub fn logical_host(&self) -> &str {
        &self.logical_host
    }

    /// Rewrite an absolute-URI request into the origin-form request sent on
    /// the dialed connection, with the `Host` header overridden to the
    /// logical name.
    fn to_origin_form(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Result<Request<Full<Bytes>>, ApiError> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or("/", http::uri::PathAndQuery::as_str);
        parts.uri = path_and_query
            .parse()
            .map_err(|e: http::uri::InvalidUri| ApiError::InvalidUrl {
                url: path_and_query.to_owned(),
                reason: e.to_string(),
            })?;

        parts.headers.insert(
            http::header::HOST,
            http::HeaderValue::try_from(self.logical_host.as_str())?,
        );

        Ok(Request::from_parts(parts, body))
    }
}

#[async_trait]
impl Transport for SecureInternalTransport {
    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<ResponseBody>, ApiError> {
        let uri = req.uri().clone();
        let scheme = uri.scheme_str().unwrap_or("https");
        let host = uri
            .host()
            .ok_or_else(|| ApiError::InvalidUrl {
                url: uri.to_string(),
                reason: "missing host".to_owned(),
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        let port = uri.port_u16().unwrap_or(match scheme {
            "http" => 80,
            _ => 443,
        });

        let req = self.to_origin_form(req)?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;

        match scheme {
            "http" => exchange(stream, req).await,
            "https" => {
                // SNI carries the logical name, not the dialed address
                let server_name =
                    ServerName::try_from(self.logical_host.clone()).map_err(|e| {
                        ApiError::InvalidUrl {
                            url: self.logical_host.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                let connector = TlsConnector::from(self.tls_config.clone());
                let tls = connector.connect(server_name, stream).await?;
                exchange(tls, req).await
            }
            other => Err(ApiError::InvalidUrl {
                url: uri.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

/// Drive one HTTP/1.1 exchange over an established connection.
async fn exchange<IO>(
    io: IO,
    req: Request<Full<Bytes>>,
) -> Result<Response<ResponseBody>, ApiError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    // The connection task owns the socket until the body is fully read
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "internal connection ended with error");
        }
    });

    let response = sender.send_request(req).await?;
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, body.map_err(Into::into).boxed()))
}
