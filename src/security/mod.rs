//! Path-scoped authentication.
//!
//! A [`SecurityRule`] binds a [`PathPattern`] (optionally narrowed to some
//! methods) to a challenge scheme and a required role. The [`AuthGate`] walks
//! the rules in registration order, takes the first one that applies, and
//! turns it into a [`Decision`]. Only [`Decision::Allow`] lets a request reach
//! the router; a denial is an ordinary value, never an error.

use serde::Deserialize;

use crate::Method;
use crate::Request;
use crate::router::{PathPattern, PatternError};

pub mod gate;
pub mod store;

pub use gate::{AuthGate, BasicCredentials, Decision};
pub use store::{ANY_ROLE, Principal, UserStore};

/// How a protected path asks for credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthScheme {
    /// The path is explicitly unprotected.
    None,
    /// HTTP Basic authentication (RFC 7617).
    #[default]
    Basic,
}

fn default_realm() -> String {
    "Restricted".to_owned()
}

/// One security constraint.
///
/// # Examples
///
/// ```
/// use embedhttp::security::SecurityRule;
///
/// let rule = SecurityRule::basic("/*", "appuser", "Secured App").unwrap();
/// assert_eq!(rule.realm(), "Secured App");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityRule {
    pattern: PathPattern,
    #[serde(default)]
    scheme: AuthScheme,
    #[serde(default)]
    required_role: String,
    #[serde(default = "default_realm")]
    realm: String,
    /// Methods this rule is limited to. Empty means every method.
    #[serde(default)]
    methods: Vec<Method>,
}

impl SecurityRule {
    /// A rule demanding Basic credentials of a user holding `role`.
    ///
    /// Pass [`ANY_ROLE`] to admit every authenticated user.
    pub fn basic(
        pattern: &str,
        role: impl Into<String>,
        realm: impl Into<String>,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            scheme: AuthScheme::Basic,
            required_role: role.into(),
            realm: realm.into(),
            methods: Vec::new(),
        })
    }

    /// A rule leaving `pattern` unprotected, shadowing broader rules after it.
    pub fn open(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            scheme: AuthScheme::None,
            required_role: String::new(),
            realm: default_realm(),
            methods: Vec::new(),
        })
    }

    /// Restricts the rule to `methods`.
    #[must_use]
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn required_role(&self) -> &str {
        &self.required_role
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// `true` when the rule's pattern and method list both cover `request`.
    pub fn applies_to(&self, request: &Request) -> bool {
        let method_ok = self.methods.is_empty() || self.methods.contains(request.method());
        method_ok && self.pattern.matches(request.path()).is_some()
    }
}
