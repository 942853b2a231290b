//! HTTP/1.1 response builder and writer.
//!
//! Handlers build a [`Response`] with the fluent API; the connection loop
//! hands it to [`Response::write_to`], which serializes it in one buffer and
//! flushes.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use embedhttp::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok).body("Hello from Embedded Tomcat\n");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 27\r\n"));
/// assert!(text.ends_with("\r\n\r\nHello from Embedded Tomcat\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
    head_only: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
            head_only: false,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// `Content-Length` is derived from the body when the response is written.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Writes the head only. `Content-Length` still describes the body, as a
    /// reply to `HEAD` requires.
    #[must_use]
    pub fn without_body(mut self) -> Self {
        self.head_only = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body bytes, without headers.
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    /// Whether the connection stays open after this response.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Adds, in this order after the handler's own headers:
    /// - `Content-Type: text/plain; charset=utf-8` when the body is non-empty and
    ///   no `Content-Type` was set.
    /// - `Connection: keep-alive` or `Connection: close`.
    /// - `Content-Length: <n>` computed from the body. A `Content-Length` set by
    ///   the handler is discarded.
    ///
    /// The body bytes follow the head unless [`without_body`](Self::without_body)
    /// was called.
    pub fn into_bytes(mut self) -> BytesMut {
        let content_length = self.body.len();

        self.headers.remove("content-length");
        self.headers.remove("connection");

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.insert("Connection", connection);

        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n\r\n").as_bytes());
        if !self.head_only {
            buf.put(self.body.as_slice());
        }

        buf
    }

    /// Writes the serialized response to `writer` and flushes it.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the peer went away mid-write. The
    /// response is not retried.
    pub async fn write_to<W>(self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = self.into_bytes();
        writer.write_all(&bytes).await?;
        writer.flush().await
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(bytes: BytesMut) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn simple_ok_response() {
        let r = Response::new(StatusCode::Ok).body("Hello");
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn handler_content_length_is_replaced() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Length", "999")
            .body("abc");
        let s = to_string(r.into_bytes());
        assert_eq!(s.matches("Content-Length").count(), 1);
        assert!(s.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body("{}");
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Type: application/json\r\n"));
        assert!(!s.contains("text/plain"));
    }

    #[test]
    fn empty_body_has_no_content_type() {
        let r = Response::new(StatusCode::NoContent);
        let s = to_string(r.into_bytes());
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn connection_close() {
        let r = Response::new(StatusCode::BadRequest).keep_alive(false);
        let s = to_string(r.into_bytes());
        assert!(s.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn head_reply_keeps_length_but_drops_body() {
        let r = Response::new(StatusCode::Ok).body("Hello").without_body();
        let s = to_string(r.into_bytes());
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.ends_with("Content-Length: 5\r\n\r\n"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let build = || {
            Response::new(StatusCode::Ok)
                .header("X-Request-Kind", "greeting")
                .body("same")
        };
        assert_eq!(build().into_bytes(), build().into_bytes());
    }

    #[tokio::test]
    async fn write_to_emits_whole_response() {
        let mut sink: Vec<u8> = Vec::new();
        Response::new(StatusCode::Unauthorized)
            .header("WWW-Authenticate", r#"Basic realm="Secured App""#)
            .body("Unauthorized")
            .write_to(&mut sink)
            .await
            .unwrap();
        let s = String::from_utf8(sink).unwrap();
        assert!(s.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(s.contains("WWW-Authenticate: Basic realm=\"Secured App\"\r\n"));
        assert!(s.ends_with("Unauthorized"));
    }
}
