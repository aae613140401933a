use crate::error::{ApiError, ValidationErrors};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Maximum body preview size used in error messages (8KB).
///
/// Non-2xx bodies are included in the structured error for debugging; this
/// bounds how much is kept.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Boxed response body shared by every transport, so an internal-transport
/// response is substitutable wherever a standard response is expected.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Read a streaming response body into memory, enforcing the size limit.
///
/// # Errors
///
/// Returns [`ApiError::BodyTooLarge`] when the limit is exceeded, or
/// [`ApiError::Transport`] when the stream fails mid-read.
pub(crate) async fn read_body_limited(
    response: http::Response<ResponseBody>,
    limit: usize,
) -> Result<(http::response::Parts, Bytes), ApiError> {
    let (parts, body) = response.into_parts();

    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ApiError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(ApiError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok((parts, Bytes::from(collected)))
}

/// Shape of the backend's error body: a human message plus field-keyed
/// validation errors.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<ValidationErrors>,
}

/// Build the structured error for a non-2xx response, pulling the message
/// and validation errors out of the body when it parses as JSON.
#[must_use]
pub(crate) fn status_error(status: StatusCode, body: &Bytes) -> ApiError {
    let payload: Option<ErrorPayload> = serde_json::from_slice(body).ok();

    let (message, errors) = match payload {
        Some(payload) => {
            let message = payload.message.unwrap_or_else(|| default_message(status));
            (message, payload.errors)
        }
        None => {
            let preview_len = body.len().min(ERROR_BODY_PREVIEW_LIMIT);
            let preview = String::from_utf8_lossy(&body[..preview_len]);
            let message = if preview.trim().is_empty() {
                default_message(status)
            } else {
                preview.into_owned()
            };
            (message, None)
        }
    };

    ApiError::Status {
        status,
        message,
        errors,
    }
}

fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_owned()
}

/// The verb-level result envelope: parsed payload, numeric status, and a
/// success marker.
///
/// `data` is `None` when the body was empty or not JSON; a malformed body on
/// a 2xx response is tolerated rather than treated as an error.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub status: u16,
    pub success: bool,
}

impl<T: DeserializeOwned> ApiResponse<T> {
    pub(crate) fn from_body(status: StatusCode, body: &Bytes) -> Self {
        let data = if body.is_empty() {
            None
        } else {
            serde_json::from_slice(body).ok()
        };
        Self {
            data,
            status: status.as_u16(),
            success: status.is_success(),
        }
    }
}

/// A buffered response with on-demand body readers, for callers that need
/// status/headers or non-JSON payloads.
#[derive(Debug)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Content-Type` header value, if present
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Raw body bytes
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text (lossy)
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Json`] when the body does not parse.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn boxed(data: &[u8]) -> ResponseBody {
        Full::new(Bytes::from(data.to_vec()))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed()
    }

    #[tokio::test]
    async fn read_body_within_limit() {
        let response = http::Response::builder()
            .status(StatusCode::OK)
            .body(boxed(b"hello"))
            .unwrap();

        let (parts, body) = read_body_limited(response, 1024).await.unwrap();
        assert_eq!(parts.status, StatusCode::OK);
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn read_body_over_limit_fails() {
        let response = http::Response::builder()
            .status(StatusCode::OK)
            .body(boxed(&[0u8; 2048]))
            .unwrap();

        let err = read_body_limited(response, 1024).await.unwrap_err();
        assert!(matches!(err, ApiError::BodyTooLarge { limit: 1024, .. }));
    }

    #[test]
    fn envelope_parses_json_payload() {
        #[derive(Debug, serde::Deserialize)]
        struct Article {
            id: i64,
        }

        let body = Bytes::from_static(br#"{"id": 5}"#);
        let resp: ApiResponse<Article> = ApiResponse::from_body(StatusCode::OK, &body);
        assert_eq!(resp.status, 200);
        assert!(resp.success);
        assert_eq!(resp.data.unwrap().id, 5);
    }

    #[test]
    fn envelope_tolerates_empty_and_malformed_bodies() {
        let empty: ApiResponse<serde_json::Value> =
            ApiResponse::from_body(StatusCode::NO_CONTENT, &Bytes::new());
        assert!(empty.data.is_none());
        assert!(empty.success);
        assert_eq!(empty.status, 204);

        let malformed: ApiResponse<serde_json::Value> =
            ApiResponse::from_body(StatusCode::OK, &Bytes::from_static(b"<html>oops</html>"));
        assert!(malformed.data.is_none());
        assert!(malformed.success);
    }

    #[test]
    fn status_error_extracts_validation_payload() {
        let body = Bytes::from_static(
            br#"{"message":"The given data was invalid.","errors":{"title":["Title is required."]}}"#,
        );
        let err = status_error(StatusCode::UNPROCESSABLE_ENTITY, &body);

        match err {
            ApiError::Status {
                status,
                message,
                errors,
            } => {
                assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
                assert_eq!(message, "The given data was invalid.");
                let errors = errors.expect("validation errors should be parsed");
                assert_eq!(errors["title"], vec!["Title is required."]);
            }
            other => panic!("expected Status error, got: {other:?}"),
        }
    }

    #[test]
    fn status_error_falls_back_to_body_preview() {
        let err = status_error(
            StatusCode::BAD_GATEWAY,
            &Bytes::from_static(b"upstream connect error"),
        );
        match err {
            ApiError::Status {
                status, message, errors,
            } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "upstream connect error");
                assert!(errors.is_none());
            }
            other => panic!("expected Status error, got: {other:?}"),
        }
    }

    #[test]
    fn status_error_empty_body_uses_canonical_reason() {
        let err = status_error(StatusCode::NOT_FOUND, &Bytes::new());
        match err {
            ApiError::Status { message, .. } => assert_eq!(message, "Not Found"),
            other => panic!("expected Status error, got: {other:?}"),
        }
    }

    #[test]
    fn raw_response_readers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );
        let raw = RawResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(br#"{"ok":true}"#),
        );

        assert_eq!(raw.status(), StatusCode::OK);
        assert_eq!(raw.content_type(), Some("application/json"));
        assert_eq!(raw.text(), r#"{"ok":true}"#);
        let value: serde_json::Value = raw.json().unwrap();
        assert_eq!(value["ok"], true);
    }
}
