//! In-memory user store for Basic authentication.
//!
//! Passwords are kept only as SHA-256 digests. [`UserStore::authenticate`]
//! compares digests in constant time and does the same amount of work for
//! unknown users, so neither the response nor its timing tells a client
//! whether the username or the password was wrong.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::ConfigError;

/// Role name that every authenticated user holds implicitly.
pub const ANY_ROLE: &str = "*";

type PasswordDigest = [u8; 32];

// Compared against when the username is unknown.
const UNKNOWN_USER_DIGEST: PasswordDigest = [0u8; 32];

fn digest(password: &str) -> PasswordDigest {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(password.as_bytes()));
    out
}

/// An authenticated user as seen by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
    roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, R>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// `true` if the user holds `role`. [`ANY_ROLE`] is held by everyone.
    pub fn has_role(&self, role: &str) -> bool {
        role == ANY_ROLE || self.roles.contains(role)
    }
}

struct Account {
    digest: PasswordDigest,
    roles: BTreeSet<String>,
}

/// Username → password digest and roles.
///
/// Filled in at configuration time and shared read-only while serving.
///
/// # Examples
///
/// ```
/// use embedhttp::security::UserStore;
///
/// let mut users = UserStore::new();
/// users.add_user("user", "s3cr3t");
/// users.add_role("user", "appuser").unwrap();
///
/// let principal = users.authenticate("user", "s3cr3t").unwrap();
/// assert!(principal.has_role("appuser"));
/// assert!(users.authenticate("user", "wrong").is_none());
/// ```
#[derive(Default)]
pub struct UserStore {
    accounts: HashMap<String, Account>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `username` or resets its password. Existing roles are kept.
    pub fn add_user(&mut self, username: impl Into<String>, password: &str) {
        let digest = digest(password);
        self.accounts
            .entry(username.into())
            .and_modify(|account| account.digest = digest)
            .or_insert_with(|| Account {
                digest,
                roles: BTreeSet::new(),
            });
    }

    /// Grants `role` to an existing user.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownUser`] if `username` was never added.
    pub fn add_role(&mut self, username: &str, role: impl Into<String>) -> Result<(), ConfigError> {
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| ConfigError::UnknownUser {
                username: username.to_owned(),
            })?;
        account.roles.insert(role.into());
        Ok(())
    }

    /// Builder form of [`add_user`](Self::add_user) plus [`add_role`](Self::add_role).
    #[must_use]
    pub fn with_user<I, R>(mut self, username: &str, password: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.add_user(username, password);
        if let Some(account) = self.accounts.get_mut(username) {
            account.roles.extend(roles.into_iter().map(Into::into));
        }
        self
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Checks `password` for `username`.
    ///
    /// Returns `None` for an unknown user and for a wrong password alike.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Principal> {
        let supplied = digest(password);
        let account = self.accounts.get(username);
        let expected = account.map_or(&UNKNOWN_USER_DIGEST, |account| &account.digest);

        let password_ok: bool = supplied[..].ct_eq(&expected[..]).into();
        match account {
            Some(account) if password_ok => Some(Principal {
                name: username.to_owned(),
                roles: account.roles.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for UserStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.accounts.keys().collect();
        names.sort();
        f.debug_struct("UserStore").field("users", &names).finish()
    }
}
