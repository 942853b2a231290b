//! URL patterns shared by route mappings and security rules.
//!
//! | Pattern     | Kind   | Matches                         | Path info        |
//! |-------------|--------|---------------------------------|------------------|
//! | `/status`   | exact  | `/status` only                  | *(none)*         |
//! | `/files/*`  | prefix | `/files`, `/files/a/b.txt`      | `/a/b.txt`       |
//! | `/*`        | prefix | every path                      | the whole path   |
//!
//! A prefix pattern only matches at a segment boundary: `/files/*` does not
//! match `/filesystem`.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Reasons a pattern string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern {pattern:?} must start with '/'")]
    MissingLeadingSlash { pattern: String },

    #[error("pattern {pattern:?} may only use '*' as a trailing \"/*\"")]
    MisplacedWildcard { pattern: String },
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum PathPattern {
    /// Matches one literal path.
    Exact(String),
    /// Matches the prefix itself and everything below it. The stored prefix
    /// has the `/*` stripped, so `/*` is stored as the empty string.
    Prefix(String),
}

/// Result of matching a path against a [`PathPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathMatch<'a> {
    /// Remainder of the path below a prefix pattern, if non-empty.
    pub path_info: Option<&'a str>,
}

impl PathPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern does not start with `/` or uses
    /// `*` anywhere but a trailing `/*`.
    ///
    /// # Examples
    ///
    /// ```
    /// use embedhttp::router::PathPattern;
    ///
    /// let pattern = PathPattern::parse("/files/*").unwrap();
    /// assert_eq!(pattern, PathPattern::Prefix("/files".into()));
    /// assert!(PathPattern::parse("files").is_err());
    /// ```
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash {
                pattern: pattern.to_owned(),
            });
        }

        let (literal, is_prefix) = match pattern.strip_suffix("/*") {
            Some(prefix) => (prefix, true),
            None => (pattern, false),
        };

        if literal.contains('*') {
            return Err(PatternError::MisplacedWildcard {
                pattern: pattern.to_owned(),
            });
        }

        Ok(if is_prefix {
            PathPattern::Prefix(literal.to_owned())
        } else {
            PathPattern::Exact(literal.to_owned())
        })
    }

    /// Matches `path` against this pattern.
    pub fn matches<'a>(&self, path: &'a str) -> Option<PathMatch<'a>> {
        match self {
            PathPattern::Exact(literal) => (literal == path).then_some(PathMatch { path_info: None }),
            PathPattern::Prefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    Some(PathMatch { path_info: None })
                } else if rest.starts_with('/') {
                    Some(PathMatch {
                        path_info: Some(rest),
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Ordering key for choosing between several matching patterns.
    ///
    /// The longest literal wins; at equal length an exact pattern beats a
    /// prefix one. Since `/*` has an empty literal it loses to everything.
    pub fn specificity(&self) -> (usize, bool) {
        match self {
            PathPattern::Exact(literal) => (literal.len(), true),
            PathPattern::Prefix(prefix) => (prefix.len(), false),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(literal) => f.write_str(literal),
            PathPattern::Prefix(prefix) => write!(f, "{prefix}/*"),
        }
    }
}

impl std::str::FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_patterns() {
        assert_eq!(PathPattern::parse("/").unwrap(), PathPattern::Exact("/".into()));
        assert_eq!(
            PathPattern::parse("/status").unwrap(),
            PathPattern::Exact("/status".into())
        );
        assert_eq!(PathPattern::parse("/*").unwrap(), PathPattern::Prefix(String::new()));
        assert_eq!(
            PathPattern::parse("/api/v1/*").unwrap(),
            PathPattern::Prefix("/api/v1".into())
        );
    }

    #[test]
    fn parse_rejects_bad_patterns() {
        assert!(matches!(
            PathPattern::parse("status"),
            Err(PatternError::MissingLeadingSlash { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/*/b"),
            Err(PatternError::MisplacedWildcard { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/*.html"),
            Err(PatternError::MisplacedWildcard { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["/", "/*", "/files/*", "/a/b"] {
            assert_eq!(PathPattern::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn exact_matches_only_itself() {
        let p = PathPattern::parse("/users").unwrap();
        assert!(p.matches("/users").is_some());
        assert!(p.matches("/users/").is_none());
        assert!(p.matches("/users/1").is_none());
    }

    #[test]
    fn catch_all_matches_everything() {
        let p = PathPattern::parse("/*").unwrap();
        assert_eq!(p.matches("/").unwrap().path_info, Some("/"));
        assert_eq!(p.matches("/a/b").unwrap().path_info, Some("/a/b"));
    }

    #[test]
    fn prefix_matches_on_segment_boundary() {
        let p = PathPattern::parse("/files/*").unwrap();
        assert_eq!(p.matches("/files").unwrap().path_info, None);
        assert_eq!(p.matches("/files/a.txt").unwrap().path_info, Some("/a.txt"));
        assert!(p.matches("/filesystem").is_none());
        assert!(p.matches("/other").is_none());
    }

    #[test]
    fn specificity_prefers_longer_then_exact() {
        let catch_all = PathPattern::parse("/*").unwrap();
        let root = PathPattern::parse("/").unwrap();
        let files = PathPattern::parse("/files/*").unwrap();
        let files_exact = PathPattern::parse("/files").unwrap();
        assert!(root.specificity() > catch_all.specificity());
        assert!(files.specificity() > root.specificity());
        assert!(files_exact.specificity() > files.specificity());
    }
}
