//! Per-request context handed to handlers.
//!
//! Bundles the parsed [`Request`] with what the server learned about it on the
//! way in: the authenticated [`Principal`] (when a Basic rule admitted the
//! request) and the path info left over after a prefix route matched.

use crate::Request;
use crate::security::Principal;

/// Everything a handler gets to see about one request.
#[derive(Debug, Clone)]
pub struct Context {
    request: Request,
    principal: Option<Principal>,
    path_info: Option<String>,
}

impl Context {
    /// Creates a context for an anonymous request with no path info.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            principal: None,
            path_info: None,
        }
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    #[must_use]
    pub fn with_path_info(mut self, path_info: Option<String>) -> Self {
        self.path_info = path_info;
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The authenticated user, if a Basic rule protected this path.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// Path below the matched prefix route, e.g. `/a.txt` for `/files/a.txt`
    /// under `/files/*`.
    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn new_context_is_anonymous() {
        let ctx = Context::new(request("GET / HTTP/1.1\r\n\r\n"));
        assert!(ctx.principal().is_none());
        assert!(ctx.path_info().is_none());
        assert_eq!(ctx.request().path(), "/");
    }

    #[test]
    fn carries_principal_and_path_info() {
        let principal = Principal::new("user", ["appuser"]);
        let ctx = Context::new(request("GET /files/a.txt HTTP/1.1\r\n\r\n"))
            .with_principal(Some(principal))
            .with_path_info(Some("/a.txt".to_owned()));
        assert_eq!(ctx.principal().map(Principal::name), Some("user"));
        assert_eq!(ctx.path_info(), Some("/a.txt"));
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Greeting {
            name: String,
        }
        let ctx = Context::new(request(
            "POST / HTTP/1.1\r\nContent-Length: 15\r\n\r\n{\"name\":\"rust\"}",
        ));
        let greeting: Greeting = ctx.json().unwrap();
        assert_eq!(greeting.name, "rust");
    }
}
