//! Header map with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, multi-value HTTP header map.
///
/// Entries keep the order they were added in; lookups ignore ASCII case as
/// RFC 9110 §5.1 requires.
///
/// # Examples
///
/// ```
/// use embedhttp::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("WWW-Authenticate", r#"Basic realm="Secured App""#);
/// assert_eq!(headers.get("www-authenticate"), Some(r#"Basic realm="Secured App""#));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry. Earlier values under the same name are kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value stored under `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries under `name`. Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Number of entries, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Authorization", "Basic dXNlcjpzM2NyM3Q=");
        assert_eq!(h.get("authorization"), Some("Basic dXNlcjpzM2NyM3Q="));
        assert_eq!(h.get("AUTHORIZATION"), Some("Basic dXNlcjpzM2NyM3Q="));
        assert!(h.contains("AuThOrIzAtIoN"));
        assert!(!h.contains("cookie"));
    }

    #[test]
    fn insert_keeps_repeated_names() {
        let mut h = Headers::new();
        h.insert("Set-Cookie", "a=1");
        h.insert("set-cookie", "b=2");
        let values: Vec<_> = h.get_all("SET-COOKIE").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("X-Foo", "bar");
        assert!(h.remove("x-foo"));
        assert!(h.is_empty());
        assert!(!h.remove("x-foo"));
    }

    #[test]
    fn display_uses_wire_format() {
        let mut h = Headers::new();
        h.insert("Host", "localhost");
        assert_eq!(h.to_string(), "Host: localhost\r\n");
    }
}
