//! Serves a greeting behind HTTP Basic authentication.
//!
//! ```text
//! cargo run --example hello_basic_auth
//! curl -u user:s3cr3t http://127.0.0.1:8080/
//! ```
//!
//! Set `RUST_LOG=embedhttp=debug` to watch requests go through the gate.

use embedhttp::config::ServerConfig;
use embedhttp::security::{AuthGate, SecurityRule, UserStore};
use embedhttp::{Context, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut router = Router::new();
    router.register("/*", |ctx: Context| async move {
        let who = ctx.principal().map_or("stranger", |p| p.name()).to_owned();
        Response::new(StatusCode::Ok).body(format!("Hello, {who}, from embedhttp\n"))
    })?;
    router.register("/health", |_ctx| async { Response::new(StatusCode::NoContent) })?;

    let mut users = UserStore::new();
    users.add_user("user", "s3cr3t");
    users.add_role("user", "appuser")?;

    let gate = AuthGate::new(users)
        .rule(SecurityRule::open("/health")?)
        .rule(SecurityRule::basic("/*", "appuser", "Secured App")?);

    let config = ServerConfig {
        port: 8080,
        ..ServerConfig::local()
    };
    let running = Server::new(config, router, gate).start().await?;
    tracing::info!("try: curl -u user:s3cr3t http://{}/", running.local_addr());

    tokio::signal::ctrl_c().await?;
    running.stop().await?;
    Ok(())
}
