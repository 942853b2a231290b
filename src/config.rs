//! Server and security configuration.
//!
//! Both halves deserialize from JSON with `serde`, with defaults for every
//! field but the security rules' patterns. Routes are not configuration;
//! handlers are registered in code on a [`Router`](crate::Router).
//!
//! ```json
//! {
//!   "server":   { "host": "127.0.0.1", "port": 0 },
//!   "security": {
//!     "rules": [ { "pattern": "/*", "required_role": "appuser", "realm": "Secured App" } ],
//!     "users": [ { "username": "user", "password": "s3cr3t", "roles": ["appuser"] } ]
//!   }
//! }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::security::{AuthGate, SecurityRule, UserStore};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("role granted to unknown user {username:?}")]
    UnknownUser { username: String },
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind. Defaults to every IPv4 interface.
    pub host: IpAddr,
    /// Port to bind; `0` asks the OS for a free one.
    pub port: u16,
    /// How long an idle or stalled connection may stay silent.
    pub read_timeout_ms: u64,
    /// How long [`stop`](crate::RunningServer::stop) waits for in-flight requests.
    pub shutdown_grace_ms: u64,
    /// Upper bound on one request's head plus body.
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            read_timeout_ms: 20_000,
            shutdown_grace_ms: 5_000,
            max_request_size: 8 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Loopback on an OS-assigned port; what tests and embedders usually want.
    pub fn local() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// A user entry with a clear-text password, hashed when the gate is built.
#[derive(Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Security rules and the users they authenticate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub rules: Vec<SecurityRule>,
    pub users: Vec<UserConfig>,
}

impl SecurityConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Hashes the passwords into a [`UserStore`] and builds the [`AuthGate`].
    pub fn into_gate(self) -> AuthGate {
        let mut users = UserStore::new();
        for user in self.users {
            users = users.with_user(&user.username, &user.password, user.roles);
        }
        self.rules.into_iter().fold(AuthGate::new(users), AuthGate::rule)
    }
}

/// Complete configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Request;

    #[test]
    fn server_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn server_overrides() {
        let config =
            ServerConfig::from_json(r#"{ "host": "127.0.0.1", "port": 8080, "shutdown_grace_ms": 250 }"#)
                .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.shutdown_grace(), Duration::from_millis(250));
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(
            ServerConfig::from_json(r#"{ "port": "eighty" }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn full_document_builds_a_working_gate() {
        let config = Config::from_json(
            r#"{
                "server": { "host": "127.0.0.1" },
                "security": {
                    "rules": [ { "pattern": "/*", "required_role": "appuser", "realm": "Secured App" } ],
                    "users": [ { "username": "user", "password": "s3cr3t", "roles": ["appuser"] } ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));

        let gate = config.security.into_gate();
        assert_eq!(gate.rules().len(), 1);
        assert!(gate.users().contains("user"));

        let raw = b"GET / HTTP/1.1\r\nAuthorization: Basic dXNlcjpzM2NyM3Q=\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        assert!(gate.authorize(&request).is_allowed());
    }

    #[test]
    fn user_debug_hides_password() {
        let config = SecurityConfig::from_json(
            r#"{ "users": [ { "username": "user", "password": "s3cr3t" } ] }"#,
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
