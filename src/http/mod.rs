//! HTTP/1.1 protocol types.
//!
//! [`Method`], [`StatusCode`] and [`Headers`] are shared by the parser in
//! [`request`] and the writer in [`response`].

use std::fmt;

use serde::Deserialize;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::{Request, RequestError};
pub use response::Response;

/// An HTTP response status code.
///
/// Only the codes the server itself emits, plus the ones handlers commonly
/// need, are enumerated.
///
/// # Examples
///
/// ```
/// use embedhttp::http::StatusCode;
///
/// let status = StatusCode::Unauthorized;
/// assert_eq!(status.as_u16(), 401);
/// assert_eq!(status.canonical_reason(), "Unauthorized");
/// assert!(status.is_client_error());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    // 2xx
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    // 3xx
    MovedPermanently = 301,
    Found = 302,
    NotModified = 304,

    // 4xx
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    RequestTimeout = 408,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    RequestHeaderFieldsTooLarge = 431,

    // 5xx
    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the canonical reason phrase for this status code.
    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::Accepted => "Accepted",
            Self::NoContent => "No Content",
            Self::MovedPermanently => "Moved Permanently",
            Self::Found => "Found",
            Self::NotModified => "Not Modified",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::LengthRequired => "Length Required",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UriTooLong => "URI Too Long",
            Self::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ServiceUnavailable => "Service Unavailable",
            Self::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    /// Returns `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Returns `true` for 4xx codes.
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Returns `true` for 5xx codes.
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

/// An HTTP request method.
///
/// Deserializes from its wire token, so security rules can list methods as
/// plain strings (`["GET", "POST"]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as its wire token.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl From<String> for Method {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_wire_token() {
        for token in ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"] {
            let method: Method = token.parse().unwrap();
            assert_eq!(method.as_str(), token);
        }
    }

    #[test]
    fn unknown_method_is_custom() {
        let method: Method = "PROPFIND".parse().unwrap();
        assert_eq!(method, Method::Custom("PROPFIND".to_owned()));
    }

    #[test]
    fn method_deserializes_from_string() {
        let methods: Vec<Method> = serde_json::from_str(r#"["GET","BREW"]"#).unwrap();
        assert_eq!(methods, vec![Method::Get, Method::Custom("BREW".into())]);
    }

    #[test]
    fn status_display_includes_reason() {
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        assert!(StatusCode::NotImplemented.is_server_error());
        assert!(StatusCode::Ok.is_success());
    }
}
