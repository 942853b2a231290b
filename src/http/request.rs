//! HTTP/1.1 request parsing using the [`httparse`] crate.
//!
//! Only `Content-Length` delimited bodies are understood. A request that
//! announces a `Transfer-Encoding` is rejected rather than misframed.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("header {name:?} has a value that is not valid UTF-8")]
    InvalidHeaderValue { name: String },

    #[error("unsupported Transfer-Encoding: {value:?}")]
    UnsupportedTransferEncoding { value: String },

    #[error("request exceeds maximum allowed size of {max_bytes} bytes")]
    BodyTooLarge { max_bytes: usize },
}

impl RequestError {
    /// `true` when the bytes seen so far are a valid prefix of a request.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete)
    }
}

/// A fully parsed HTTP/1.1 request.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body holds exactly
/// `Content-Length` bytes; anything after it belongs to the next request on
/// the connection.
///
/// # Examples
///
/// ```
/// use embedhttp::http::request::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, consumed) = Request::parse(raw).unwrap();
///
/// assert_eq!(consumed, raw.len());
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses one request from the front of `buf` with no size limit.
    ///
    /// See [`Request::parse_with_limit`].
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        Self::parse_with_limit(buf, usize::MAX)
    }

    /// Parses one request from the front of `buf`.
    ///
    /// Returns the request and the number of bytes it occupied (head plus
    /// body).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head or the body is not fully buffered yet.
    /// - [`RequestError::Parse`] — malformed request line or header line.
    /// - [`RequestError::InvalidHeaderValue`] — a header value is not UTF-8.
    /// - [`RequestError::InvalidContentLength`] — `Content-Length` is not a number,
    ///   or repeated with different values.
    /// - [`RequestError::UnsupportedTransferEncoding`] — the body is not
    ///   `Content-Length` delimited.
    /// - [`RequestError::BodyTooLarge`] — head plus announced body exceed `max_bytes`.
    pub fn parse_with_limit(buf: &[u8], max_bytes: usize) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .to_owned()
            .into();

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            let value = std::str::from_utf8(header.value).map_err(|_| {
                RequestError::InvalidHeaderValue {
                    name: header.name.to_owned(),
                }
            })?;
            header_map.insert(header.name, value.trim());
        }

        if let Some(value) = header_map.get("transfer-encoding") {
            return Err(RequestError::UnsupportedTransferEncoding {
                value: value.to_owned(),
            });
        }

        let content_length = content_length(&header_map)?.unwrap_or(0);
        let total = body_offset
            .checked_add(content_length)
            .filter(|total| *total <= max_bytes)
            .ok_or(RequestError::BodyTooLarge { max_bytes })?;

        if buf.len() < total {
            return Err(RequestError::Incomplete);
        }

        let params = query.as_deref().map(parse_query_string).unwrap_or_default();
        let body = Bytes::copy_from_slice(&buf[body_offset..total]);

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body,
                params,
            },
            total,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) if conn.eq_ignore_ascii_case("close") => false,
            Some(conn) if conn.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == 1,
        }
    }

    /// Returns the body length announced by `Content-Length`, if any.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }
}

// Every Content-Length occurrence must be a plain decimal and all must agree.
fn content_length(headers: &Headers) -> Result<Option<usize>, RequestError> {
    let mut length = None;
    for value in headers.get_all("content-length") {
        let invalid = || RequestError::InvalidContentLength {
            value: value.to_owned(),
        };
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let parsed: usize = value.parse().map_err(|_| invalid())?;
        match length {
            Some(previous) if previous != parsed => return Err(invalid()),
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

/// Parses a URL query string (`key=value&key2=value2`) into a `HashMap`.
///
/// `+` decodes to a space; percent-escapes are passed through untouched.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.replace('+', " "), value.replace('+', " "))
        })
        .collect()
}
