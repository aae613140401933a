use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::distr::Alphanumeric;

struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<mime::Mime>,
    data: Bytes,
}

/// A `multipart/form-data` request body.
///
/// Payload field conventions are the caller's concern; this type only
/// assembles the wire format.
///
/// # Example
///
/// ```ignore
/// let mut form = MultipartForm::new();
/// form.text("title", "Launch photo");
/// form.file("file", "photo.jpg", mime::IMAGE_JPEG, Bytes::from(jpeg_bytes));
///
/// let resp = client
///     .upload(ExecutionContext::Browser, "/media", &form)
///     .send::<Media>()
///     .await?;
/// ```
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    /// Create an empty form with a freshly generated boundary
    #[must_use]
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            parts: Vec::new(),
        }
    }

    /// Append a text field
    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        self.parts.push(Part {
            name: name.to_owned(),
            filename: None,
            content_type: None,
            data: Bytes::from(value.to_owned()),
        });
        self
    }

    /// Append a file field with its content type
    pub fn file(
        &mut self,
        name: &str,
        filename: &str,
        content_type: mime::Mime,
        data: Bytes,
    ) -> &mut Self {
        self.parts.push(Part {
            name: name.to_owned(),
            filename: Some(filename.to_owned()),
            content_type: Some(content_type),
            data,
        });
        self
    }

    /// The `Content-Type` header value for this form
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Number of fields appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the form has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Assemble the body bytes
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        for part in &self.parts {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");

            buf.put_slice(b"Content-Disposition: form-data; name=\"");
            buf.put_slice(escape_quoted(&part.name).as_bytes());
            buf.put_slice(b"\"");
            if let Some(filename) = &part.filename {
                buf.put_slice(b"; filename=\"");
                buf.put_slice(escape_quoted(filename).as_bytes());
                buf.put_slice(b"\"");
            }
            buf.put_slice(b"\r\n");

            if let Some(content_type) = &part.content_type {
                buf.put_slice(b"Content-Type: ");
                buf.put_slice(content_type.as_ref().as_bytes());
                buf.put_slice(b"\r\n");
            }

            buf.put_slice(b"\r\n");
            buf.put_slice(&part.data);
            buf.put_slice(b"\r\n");
        }

        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");

        buf.freeze()
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Random boundary, long enough that collision with body content is not a
/// practical concern.
fn generate_boundary() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----newsdesk-{suffix}")
}

/// Escape a value for a quoted-string parameter in Content-Disposition
fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_carries_boundary() {
        let form = MultipartForm::new();
        let content_type = form.content_type();
        assert!(content_type.starts_with("multipart/form-data; boundary=----newsdesk-"));
    }

    #[test]
    fn boundaries_are_unique_per_form() {
        let a = MultipartForm::new();
        let b = MultipartForm::new();
        assert_ne!(a.content_type(), b.content_type());
    }

    #[test]
    fn encodes_text_and_file_parts() {
        let mut form = MultipartForm::new();
        form.text("title", "Launch photo");
        form.file(
            "file",
            "photo.jpg",
            mime::IMAGE_JPEG,
            Bytes::from_static(b"\xff\xd8fake-jpeg"),
        );

        let body = form.encode();
        let text = String::from_utf8_lossy(&body);

        assert!(text.contains("Content-Disposition: form-data; name=\"title\"\r\n\r\nLaunch photo\r\n"));
        assert!(text.contains("Content-Disposition: form-data; name=\"file\"; filename=\"photo.jpg\"\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n"));

        // Terminal boundary closes the body
        let boundary = form
            .content_type()
            .split("boundary=")
            .nth(1)
            .unwrap()
            .to_owned();
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn quoted_values_are_escaped() {
        let mut form = MultipartForm::new();
        form.file(
            "file",
            "we\"ird.txt",
            mime::TEXT_PLAIN,
            Bytes::from_static(b"x"),
        );

        let body = form.encode();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"we\\\"ird.txt\""));
    }

    #[test]
    fn empty_form_is_just_the_terminator() {
        let form = MultipartForm::new();
        assert!(form.is_empty());
        let body = form.encode();
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--"));
        assert!(text.ends_with("--\r\n"));
    }
}
