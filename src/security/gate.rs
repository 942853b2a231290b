//! The authentication gate run before dispatch.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use super::{AuthScheme, Principal, SecurityRule, UserStore};
use crate::{Request, Response, StatusCode};

/// Body of every denial, whatever went wrong.
pub const DENIED_BODY: &str = "Unauthorized";

/// Outcome of [`AuthGate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Dispatch the request. Carries the user when a Basic rule admitted it.
    Allow(Option<Principal>),
    /// No usable credentials were sent.
    Challenge { realm: String },
    /// Credentials were sent but are wrong or lack the required role.
    Forbidden { realm: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Splits the decision into the admitted principal or the denial response.
    ///
    /// Challenge and Forbidden produce the same `401` with a fresh
    /// `WWW-Authenticate` challenge, so a client cannot tell a missing
    /// credential from a wrong one.
    pub fn into_result(self) -> Result<Option<Principal>, Response> {
        match self {
            Decision::Allow(principal) => Ok(principal),
            Decision::Challenge { realm } | Decision::Forbidden { realm } => {
                Err(denied_response(&realm))
            }
        }
    }
}

/// Builds the `401 Unauthorized` response for `realm`.
pub fn denied_response(realm: &str) -> Response {
    let realm = realm.replace('\\', "\\\\").replace('"', "\\\"");
    Response::new(StatusCode::Unauthorized)
        .header("WWW-Authenticate", format!("Basic realm=\"{realm}\""))
        .body(DENIED_BODY)
}

/// Username and password decoded from an `Authorization: Basic` header.
///
/// `Debug` redacts the password.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Decodes the `Authorization` header of `request`.
    ///
    /// Returns `None` when the header is absent, uses another scheme, is not
    /// valid base64 or UTF-8, or has no `:` separator.
    pub fn from_request(request: &Request) -> Option<Self> {
        Self::decode(request.headers().get("authorization")?)
    }

    /// Decodes a header value of the form `Basic <base64(username:password)>`.
    pub fn decode(header_value: &str) -> Option<Self> {
        let (scheme, encoded) = header_value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    /// Encodes the credentials as an `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Ordered security rules plus the user store they authenticate against.
///
/// # Examples
///
/// ```
/// use embedhttp::Request;
/// use embedhttp::security::{AuthGate, Decision, SecurityRule, UserStore};
///
/// let users = UserStore::new().with_user("user", "s3cr3t", ["appuser"]);
/// let gate = AuthGate::new(users)
///     .rule(SecurityRule::basic("/*", "appuser", "Secured App").unwrap());
///
/// let raw = b"GET / HTTP/1.1\r\nAuthorization: Basic dXNlcjpzM2NyM3Q=\r\n\r\n";
/// let (request, _) = Request::parse(raw).unwrap();
/// assert!(gate.authorize(&request).is_allowed());
///
/// let (anonymous, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// assert!(matches!(gate.authorize(&anonymous), Decision::Challenge { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct AuthGate {
    rules: Vec<SecurityRule>,
    users: Arc<UserStore>,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::open()
    }
}

impl AuthGate {
    /// A gate with no rules; every request is allowed.
    pub fn open() -> Self {
        Self::new(UserStore::new())
    }

    pub fn new(users: UserStore) -> Self {
        Self {
            rules: Vec::new(),
            users: Arc::new(users),
        }
    }

    /// Appends `rule`. Earlier rules take precedence.
    #[must_use]
    pub fn rule(mut self, rule: SecurityRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Decides whether `request` may be dispatched.
    pub fn authorize(&self, request: &Request) -> Decision {
        let Some(rule) = self.rules.iter().find(|rule| rule.applies_to(request)) else {
            return Decision::Allow(None);
        };

        match rule.scheme() {
            AuthScheme::None => Decision::Allow(None),
            AuthScheme::Basic => self.authorize_basic(rule, request),
        }
    }

    fn authorize_basic(&self, rule: &SecurityRule, request: &Request) -> Decision {
        let path = request.path();
        let pattern = rule.pattern();

        let Some(credentials) = BasicCredentials::from_request(request) else {
            debug!(%path, %pattern, "no usable credentials — challenging");
            return Decision::Challenge {
                realm: rule.realm().to_owned(),
            };
        };

        let principal = self
            .users
            .authenticate(&credentials.username, &credentials.password);

        match principal {
            Some(principal) if principal.has_role(rule.required_role()) => {
                debug!(%path, %pattern, "request authenticated");
                Decision::Allow(Some(principal))
            }
            Some(_) => {
                warn!(%path, %pattern, reason = "missing role", "request denied");
                Decision::Forbidden {
                    realm: rule.realm().to_owned(),
                }
            }
            None => {
                warn!(%path, %pattern, reason = "bad credentials", "request denied");
                Decision::Forbidden {
                    realm: rule.realm().to_owned(),
                }
            }
        }
    }
}
