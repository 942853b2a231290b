//! Request routing: map URL patterns to handlers.
//!
//! [`Router`] holds `(pattern, handler)` mappings. Dispatch picks the most
//! specific matching pattern (see [`PathPattern::specificity`]), so `/*` acts
//! as the catch-all and `/api/*` or an exact `/health` take precedence over
//! it. When nothing matches, the built-in [`NotFound`] handler answers.
//!
//! Routing is method-agnostic; a handler inspects
//! [`Request::method`](crate::Request::method) itself if it cares.

use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::context::Context;
use crate::security::Principal;
use crate::{Request, Response, StatusCode};

pub mod pattern;

pub use pattern::{PathMatch, PathPattern, PatternError};

/// Boxed future returned by [`Handler::call`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Shared, type-erased handler as stored in the route table.
pub type BoxedHandler = Arc<dyn Handler>;

/// A request handler: turns a [`Context`] into a [`Response`].
///
/// Implemented automatically for every
/// `Fn(Context) -> impl Future<Output = Response> + Send` closure, and may be
/// implemented by hand for named handler types.
///
/// # Examples
///
/// ```rust
/// use embedhttp::context::Context;
/// use embedhttp::router::{Handler, HandlerFuture};
/// use embedhttp::{Response, StatusCode};
///
/// struct Greeting(&'static str);
///
/// impl Handler for Greeting {
///     fn call(&self, _ctx: Context) -> HandlerFuture {
///         let body = self.0;
///         Box::pin(async move { Response::new(StatusCode::Ok).body(body) })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> HandlerFuture;
}

impl<T, F> Handler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

/// Fallback handler answering `404 Not Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn call(&self, _ctx: Context) -> HandlerFuture {
        Box::pin(async { Response::new(StatusCode::NotFound).body("Not Found") })
    }
}

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    #[error("pattern {pattern} is already registered")]
    DuplicatePattern { pattern: String },
}

// A registered mapping.
struct Route {
    pattern: PathPattern,
    handler: BoxedHandler,
}

/// The handler chosen for a path.
#[derive(Clone)]
pub struct RouteMatch {
    handler: BoxedHandler,
    pattern: Option<PathPattern>,
    path_info: Option<String>,
}

impl RouteMatch {
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// The pattern that matched, or `None` for the 404 fallback.
    pub fn pattern(&self) -> Option<&PathPattern> {
        self.pattern.as_ref()
    }

    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.pattern.is_none()
    }

    /// Runs the chosen handler.
    pub async fn invoke(self, request: Request, principal: Option<Principal>) -> Response {
        let ctx = Context::new(request)
            .with_principal(principal)
            .with_path_info(self.path_info);
        self.handler.call(ctx).await
    }
}

/// Route table mapping path patterns to handlers.
///
/// # Examples
///
/// ```rust
/// use embedhttp::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router
///     .register("/*", |_ctx| async { Response::new(StatusCode::Ok).body("catch-all") })
///     .unwrap();
/// router
///     .register("/health", |_ctx| async { Response::new(StatusCode::NoContent) })
///     .unwrap();
///
/// assert_eq!(router.dispatch("/health").pattern().unwrap().to_string(), "/health");
/// assert_eq!(router.dispatch("/anything").pattern().unwrap().to_string(), "/*");
/// assert!(router.register("/health", |_ctx| async { Response::default() }).is_err());
/// ```
pub struct Router {
    routes: Vec<Route>,
    not_found: BoxedHandler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router whose every dispatch falls back to [`NotFound`].
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            not_found: Arc::new(NotFound),
        }
    }

    /// Maps `pattern` to `handler`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidPattern`] — `pattern` does not compile.
    /// - [`RouteError::DuplicatePattern`] — an identical pattern is already mapped.
    pub fn register(&mut self, pattern: &str, handler: impl Handler) -> Result<(), RouteError> {
        let pattern = PathPattern::parse(pattern)?;
        if self.routes.iter().any(|route| route.pattern == pattern) {
            return Err(RouteError::DuplicatePattern {
                pattern: pattern.to_string(),
            });
        }
        tracing::debug!(%pattern, "route registered");
        self.routes.push(Route {
            pattern,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Replaces the handler used when no pattern matches.
    pub fn set_not_found(&mut self, handler: impl Handler) {
        self.not_found = Arc::new(handler);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterates over the registered patterns in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &PathPattern> {
        self.routes.iter().map(|route| &route.pattern)
    }

    /// Selects the handler for `path`.
    ///
    /// Among all matching patterns the most specific wins. Patterns are unique,
    /// so the choice never depends on registration order.
    pub fn dispatch(&self, path: &str) -> RouteMatch {
        let best = self
            .routes
            .iter()
            .filter_map(|route| route.pattern.matches(path).map(|m| (route, m)))
            .max_by_key(|(route, _)| route.pattern.specificity());

        match best {
            Some((route, matched)) => RouteMatch {
                handler: Arc::clone(&route.handler),
                pattern: Some(route.pattern.clone()),
                path_info: matched.path_info.map(str::to_owned),
            },
            None => RouteMatch {
                handler: Arc::clone(&self.not_found),
                pattern: None,
                path_info: None,
            },
        }
    }

    /// Dispatches `request` and awaits the chosen handler.
    pub async fn route(&self, request: Request, principal: Option<Principal>) -> Response {
        let matched = self.dispatch(request.path());
        matched.invoke(request, principal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    fn tagged(tag: &'static str) -> impl Handler {
        move |_ctx: Context| async move { Response::new(StatusCode::Ok).body(tag) }
    }

    #[test]
    fn router_starts_empty() {
        let router = Router::default();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
        assert!(router.dispatch("/").is_not_found());
    }

    #[test]
    fn duplicate_pattern_is_rejected() {
        let mut router = Router::new();
        router.register("/a/*", tagged("first")).unwrap();
        let err = router.register("/a/*", tagged("second")).unwrap_err();
        assert!(matches!(err, RouteError::DuplicatePattern { pattern } if pattern == "/a/*"));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn exact_and_prefix_of_same_literal_are_distinct() {
        let mut router = Router::new();
        router.register("/a", tagged("exact")).unwrap();
        router.register("/a/*", tagged("prefix")).unwrap();
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut router = Router::new();
        assert!(matches!(
            router.register("no-slash", tagged("x")),
            Err(RouteError::InvalidPattern(_))
        ));
    }

    #[test]
    fn longest_pattern_wins_regardless_of_order() {
        let mut router = Router::new();
        router.register("/api/v1/*", tagged("v1")).unwrap();
        router.register("/*", tagged("root")).unwrap();
        router.register("/api/*", tagged("api")).unwrap();
        router.register("/api/v1/health", tagged("health")).unwrap();

        let pick = |path: &str| router.dispatch(path).pattern().map(ToString::to_string);
        assert_eq!(pick("/api/v1/health").as_deref(), Some("/api/v1/health"));
        assert_eq!(pick("/api/v1/users").as_deref(), Some("/api/v1/*"));
        assert_eq!(pick("/api/v2").as_deref(), Some("/api/*"));
        assert_eq!(pick("/apiary").as_deref(), Some("/*"));
        assert_eq!(pick("/").as_deref(), Some("/*"));
    }

    #[test]
    fn dispatch_is_deterministic() {
        let mut router = Router::new();
        router.register("/*", tagged("root")).unwrap();
        router.register("/static/*", tagged("static")).unwrap();
        let first = router.dispatch("/static/app.css");
        for _ in 0..16 {
            let again = router.dispatch("/static/app.css");
            assert!(Arc::ptr_eq(first.handler(), again.handler()));
        }
    }

    #[test]
    fn dispatch_reports_path_info() {
        let mut router = Router::new();
        router.register("/files/*", tagged("files")).unwrap();
        assert_eq!(router.dispatch("/files/a/b.txt").path_info(), Some("/a/b.txt"));
        assert_eq!(router.dispatch("/files").path_info(), None);
    }

    #[tokio::test]
    async fn unmatched_path_returns_404() {
        let mut router = Router::new();
        router.register("/hello", tagged("hello")).unwrap();
        let res = router.route(make_request("GET", "/world"), None).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.payload(), b"Not Found");
    }

    #[tokio::test]
    async fn custom_not_found() {
        let mut router = Router::new();
        router.set_not_found(|_ctx| async { Response::new(StatusCode::NotFound).body("nope") });
        let res = router.route(make_request("GET", "/missing"), None).await;
        assert_eq!(res.payload(), b"nope");
    }

    #[tokio::test]
    async fn handler_sees_any_method() {
        let mut router = Router::new();
        router
            .register("/echo", |ctx: Context| async move {
                Response::new(StatusCode::Ok).body(ctx.request().method().to_string())
            })
            .unwrap();
        for method in ["GET", "POST", "DELETE"] {
            let res = router.route(make_request(method, "/echo"), None).await;
            assert_eq!(res.payload(), method.as_bytes());
        }
    }

    #[tokio::test]
    async fn named_handler_receives_context() {
        struct WhoAmI;

        impl Handler for WhoAmI {
            fn call(&self, ctx: Context) -> HandlerFuture {
                Box::pin(async move {
                    let name = ctx.principal().map(Principal::name).unwrap_or("anonymous");
                    let info = ctx.path_info().unwrap_or("-");
                    Response::new(StatusCode::Ok).body(format!("{name} {info}"))
                })
            }
        }

        let mut router = Router::new();
        router.register("/me/*", WhoAmI).unwrap();
        let principal = Principal::new("user", ["appuser"]);
        let res = router
            .route(make_request("GET", "/me/profile"), Some(principal))
            .await;
        assert_eq!(res.payload(), b"user /profile");
    }
}
