//! Async TCP server using Tokio.
//!
//! [`Server::start`] binds the listener and spawns the accept loop; each
//! accepted connection gets its own task in a [`JoinSet`]. A connection
//! serves its requests strictly one after another: parse, authorize, dispatch,
//! write, then read the next one (HTTP/1.1 keep-alive, no pipelining).
//!
//! Shutdown is cooperative. [`RunningServer::stop`] flips a `watch` flag:
//! the accept loop closes the listener, idle connections close at once, and a
//! connection in the middle of a request finishes writing its response with
//! `Connection: close`. Whatever is still running after the grace period is
//! aborted.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::http::{
    Method, StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Router;
use crate::security::AuthGate;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Router and gate, shared read-only by every connection task.
struct Service {
    router: Router,
    gate: AuthGate,
}

impl Service {
    async fn respond(&self, request: Request) -> Response {
        let principal = match self.gate.authorize(&request).into_result() {
            Ok(principal) => principal,
            Err(denied) => return denied,
        };

        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_owned();

        let response = self.router.route(request, principal).await;

        debug!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request handled"
        );
        response
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    read_timeout: Duration,
    max_request_size: usize,
}

/// A configured, not yet listening server.
///
/// # Examples
///
/// ```rust,no_run
/// use embedhttp::config::ServerConfig;
/// use embedhttp::security::{AuthGate, SecurityRule, UserStore};
/// use embedhttp::{Response, Router, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.register("/*", |_ctx| async {
///         Response::new(StatusCode::Ok).body("Hello from Embedded Tomcat\n")
///     })?;
///
///     let users = UserStore::new().with_user("user", "s3cr3t", ["appuser"]);
///     let gate = AuthGate::new(users).rule(SecurityRule::basic("/*", "appuser", "Secured App")?);
///
///     let running = Server::new(ServerConfig::local(), router, gate).start().await?;
///     println!("listening on port {}", running.port());
///     running.stop().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    router: Router,
    gate: AuthGate,
}

impl Server {
    pub fn new(config: ServerConfig, router: Router, gate: AuthGate) -> Self {
        Self {
            config,
            router,
            gate,
        }
    }

    /// Builds a server from a loaded [`Config`] document.
    pub fn from_config(config: Config, router: Router) -> Self {
        Self::new(config.server, router, config.security.into_gate())
    }

    /// Binds the listening socket and starts accepting connections.
    ///
    /// Returns once the socket is bound; the actual port is available through
    /// [`RunningServer::port`] even when port `0` was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let limits = ConnectionLimits {
            read_timeout: self.config.read_timeout(),
            max_request_size: self.config.max_request_size,
        };
        let service = Arc::new(Service {
            router: self.router,
            gate: self.gate,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(address = %local_addr, routes = service.router.len(), "server listening");

        let accept_task = tokio::spawn(accept_loop(
            listener,
            service,
            limits,
            shutdown_rx,
            self.config.shutdown_grace(),
        ));

        Ok(RunningServer {
            local_addr,
            shutdown: shutdown_tx,
            accept_task: Some(accept_task),
        })
    }

    /// Starts the server, runs `body` with the bound address, and always stops
    /// the server afterwards.
    ///
    /// `body` runs as its own task. If it panics, the server is stopped first
    /// and the panic is then resumed on the caller.
    ///
    /// # Errors
    ///
    /// Startup and shutdown failures as in [`start`](Self::start) and
    /// [`RunningServer::stop`].
    pub async fn run_scoped<F, Fut, T>(self, body: F) -> Result<T, ServerError>
    where
        F: FnOnce(SocketAddr) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let running = self.start().await?;
        let outcome = tokio::spawn(body(running.local_addr())).await;
        running.stop().await?;

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => match err.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(err) => Err(ServerError::Task(err)),
            },
        }
    }
}

/// Handle to a listening server.
///
/// Dropping the handle without calling [`stop`](Self::stop) still signals
/// shutdown, but does not wait for it.
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl RunningServer {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stops the server and waits until the listening socket and every
    /// connection are closed.
    ///
    /// # Errors
    ///
    /// [`ServerError::Task`] if the accept loop panicked.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown.send_replace(true);
        if let Some(task) = self.accept_task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if self.accept_task.is_some() {
            self.shutdown.send_replace(true);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<Service>,
    limits: ConnectionLimits,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    let service = Arc::clone(&service);
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, service, limits, shutdown).await {
                            warn!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_join_error(joined);
            }
        }
    }

    drop(listener);
    info!(active = connections.len(), "listener closed, draining connections");

    let drained = timeout(grace, async {
        while let Some(joined) = connections.join_next().await {
            log_join_error(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            ?grace,
            "grace period elapsed, aborting connections"
        );
        connections.shutdown().await;
    }

    info!("server stopped");
}

fn log_join_error(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "connection task panicked");
        }
    }
}

fn is_shutting_down(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

// Status used to reject a request the parser refused.
fn rejection_status(error: &RequestError) -> StatusCode {
    match error {
        RequestError::BodyTooLarge { .. } => StatusCode::PayloadTooLarge,
        RequestError::UnsupportedTransferEncoding { .. } => StatusCode::NotImplemented,
        RequestError::Parse(httparse::Error::TooManyHeaders) => {
            StatusCode::RequestHeaderFieldsTooLarge
        }
        RequestError::Parse(httparse::Error::Version) => StatusCode::HttpVersionNotSupported,
        _ => StatusCode::BadRequest,
    }
}

async fn reject<S>(stream: &mut S, status: StatusCode) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    Response::new(status)
        .body(status.canonical_reason())
        .keep_alive(false)
        .write_to(stream)
        .await
}

/// Serves one connection until the peer closes it, asks for `Connection:
/// close`, sends something unparsable, goes silent, or the server stops.
async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    service: Arc<Service>,
    limits: ConnectionLimits,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        if !buf.is_empty() {
            match Request::parse_with_limit(&buf, limits.max_request_size) {
                Ok((request, consumed)) => {
                    let _ = buf.split_to(consumed);
                    let wants_keep_alive = request.is_keep_alive();
                    let is_head = *request.method() == Method::Head;

                    let mut response = service.respond(request).await;
                    if is_head {
                        response = response.without_body();
                    }

                    let keep_alive = wants_keep_alive
                        && response.is_keep_alive()
                        && !is_shutting_down(&shutdown);
                    response.keep_alive(keep_alive).write_to(&mut stream).await?;

                    if !keep_alive {
                        debug!(%peer, "closing connection after response");
                        break;
                    }
                    continue;
                }
                Err(RequestError::Incomplete) => {}
                Err(e) => {
                    let status = rejection_status(&e);
                    warn!(%peer, error = %e, status = status.as_u16(), "rejecting request");
                    reject(&mut stream, status).await?;
                    break;
                }
            }
        }

        if buf.len() >= limits.max_request_size {
            warn!(%peer, "request head too large, sending 413");
            reject(&mut stream, StatusCode::PayloadTooLarge).await?;
            break;
        }

        let idle = buf.is_empty();
        if idle && is_shutting_down(&shutdown) {
            break;
        }

        let read = tokio::select! {
            read = timeout(limits.read_timeout, stream.read_buf(&mut buf)) => read,
            _ = shutdown.changed(), if idle => break,
        };

        match read {
            Ok(Ok(0)) => {
                debug!(%peer, "connection closed by peer");
                break;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) if idle => {
                debug!(%peer, "idle connection timed out");
                break;
            }
            Err(_) => {
                warn!(%peer, "request stalled, sending 408");
                reject(&mut stream, StatusCode::RequestTimeout).await?;
                break;
            }
        }
    }

    let _ = stream.shutdown().await;
    Ok(())
}
