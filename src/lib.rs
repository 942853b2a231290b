//! # embedhttp
//!
//! A minimal embeddable HTTP/1.1 server: one pluggable handler per path
//! pattern, guarded by path-scoped HTTP Basic authentication.
//!
//! Request flow: listener → parser → [`AuthGate`] → [`Router`] → handler →
//! response writer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use embedhttp::config::ServerConfig;
//! use embedhttp::security::{AuthGate, SecurityRule, UserStore};
//! use embedhttp::{Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.register("/*", |_ctx| async {
//!         Response::new(StatusCode::Ok).body("Hello from Embedded Tomcat\n")
//!     })?;
//!
//!     let users = UserStore::new().with_user("user", "s3cr3t", ["appuser"]);
//!     let gate = AuthGate::new(users).rule(SecurityRule::basic("/*", "appuser", "Secured App")?);
//!
//!     let server = Server::new(ServerConfig::local(), router, gate);
//!     server
//!         .run_scoped(|addr| async move {
//!             println!("Listening on http://{addr}");
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod router;
pub mod security;
pub mod server;

pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Handler, Router};
pub use security::{AuthGate, Decision, SecurityRule};
pub use server::{RunningServer, Server, ServerError};
