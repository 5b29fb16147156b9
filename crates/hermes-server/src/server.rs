//! The analysis server host.
//!
//! [`AnalysisServer`] binds a loopback listener with the current credentials,
//! rotating them and retrying when the bind fails, then runs an accept loop on
//! its own task until [`AnalysisServer::stop`] is called.
//!
//! ```text
//! Stopped ──start──► Starting ──bind ok──► Listening ──stop──► Stopped
//!                       │
//!                       └──max_start_attempts binds failed──► Faulted
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hermes_core::{AnalysisEngine, CancellationToken};
use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::HermesConfig;
use crate::credentials::{CredentialProvider, ServerConfiguration, ServerLimits};
use crate::dispatcher::AnalysisDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::handler::RequestHandler;
use crate::handshake::SidecarHandshake;
use crate::listener::{ListenerFactory, LoopbackListenerFactory};
use crate::shutdown::ConnectionTracker;

/// How long the accept task waits for open connections after shutdown.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of an [`AnalysisServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not started, or stopped.
    Stopped,
    /// Binding the listener.
    Starting,
    /// Accepting connections.
    Listening,
    /// Every start attempt failed.
    Faulted,
}

impl ServerState {
    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Faulted => "faulted",
        }
    }
}

/// Loopback HTTP server exposing an [`AnalysisEngine`].
///
/// A server is started at most once. Stopping is idempotent and also happens
/// on drop.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hermes_core::fixtures::StaticEngine;
/// use hermes_server::AnalysisServer;
///
/// # async fn example() -> Result<(), hermes_server::ServerError> {
/// let server = AnalysisServer::builder(Arc::new(StaticEngine::new())).build()?;
/// server.start().await?;
///
/// let handshake = server.handshake();
/// println!("listening on {}", handshake.prefix());
///
/// server.stop();
/// # Ok(())
/// # }
/// ```
pub struct AnalysisServer {
    provider: Arc<CredentialProvider>,
    factory: Arc<dyn ListenerFactory>,
    dispatcher: Arc<AnalysisDispatcher>,
    handler: RequestHandler,
    analyzer_property_keys: Vec<String>,
    state: RwLock<ServerState>,
    shutdown: CancellationToken,
    stopped: AtomicBool,
    local_addr: RwLock<Option<SocketAddr>>,
    connections: ConnectionTracker,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisServer {
    /// Creates a builder for a server over `engine`.
    pub fn builder(engine: Arc<dyn AnalysisEngine>) -> AnalysisServerBuilder {
        AnalysisServerBuilder::new(engine)
    }

    /// Creates a server from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid.
    pub fn from_config(config: &HermesConfig, engine: Arc<dyn AnalysisEngine>) -> ServerResult<Self> {
        config.validate()?;
        Self::builder(engine)
            .limits(config.server_limits())
            .analyzer_property_keys(config.engine.analyzer_property_keys.clone())
            .build()
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Each failed bind rotates the port and token before the next attempt.
    /// Returns the configuration the server is listening with.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if the server was started or stopped
    ///   before
    /// - [`ServerError::Faulted`] if every attempt failed to bind
    /// - [`ServerError::Stopped`] if [`AnalysisServer::stop`] ran while binding
    pub async fn start(&self) -> ServerResult<Arc<ServerConfiguration>> {
        {
            let mut state = self.state.write();
            if *state != ServerState::Stopped || self.stopped.load(Ordering::SeqCst) {
                return Err(ServerError::AlreadyStarted);
            }
            *state = ServerState::Starting;
        }

        let max_attempts = self.provider.limits().max_start_attempts;
        let mut attempt = 1;
        loop {
            let config = self.provider.current();
            match self.factory.create(config.port()).await {
                Ok(listener) => {
                    let mut state = self.state.write();
                    if *state != ServerState::Starting || self.stopped.load(Ordering::SeqCst) {
                        drop(state);
                        drop(listener);
                        tracing::info!(port = config.port(), "stopped while starting, listener released");
                        return Err(ServerError::Stopped);
                    }

                    *self.local_addr.write() = Some(listener.local_addr());
                    self.spawn_accept_loop(listener.into_inner());
                    *state = ServerState::Listening;
                    drop(state);

                    tracing::info!(port = config.port(), attempt, "analysis server listening");
                    return Ok(config);
                }
                Err(err) => {
                    tracing::warn!(
                        port = config.port(),
                        attempt,
                        max_attempts,
                        error = %err,
                        "failed to bind analysis listener"
                    );
                    if attempt >= max_attempts {
                        *self.state.write() = ServerState::Faulted;
                        tracing::error!(attempts = attempt, "analysis server faulted");
                        return Err(ServerError::Faulted {
                            attempts: attempt,
                            last_error: err,
                        });
                    }
                    if self.stopped.load(Ordering::SeqCst) {
                        return Err(ServerError::Stopped);
                    }
                    self.provider.regenerate();
                    attempt += 1;
                }
            }
        }
    }

    fn spawn_accept_loop(&self, listener: TcpListener) {
        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        let tracker = self.connections.clone();

        let task = tokio::spawn(async move {
            accept_loop(listener, handler, shutdown, tracker).await;
        });
        *self.accept_task.lock() = Some(task);
    }

    /// Stops the server: the accept loop ends, open connections are closed
    /// and every in-flight analysis is cancelled.
    ///
    /// Only the first call does anything.
    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.shutdown.cancel();
        let cancelled = self.dispatcher.cancel_all();

        let mut state = self.state.write();
        if *state != ServerState::Faulted {
            *state = ServerState::Stopped;
        }
        drop(state);

        tracing::info!(cancelled_analyses = cancelled, "analysis server stopped");
    }

    /// Waits until the accept loop has exited and open connections have been
    /// drained. Returns immediately if the server never listened.
    pub async fn join(&self) {
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "accept loop panicked");
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Configuration in force.
    pub fn configuration(&self) -> Arc<ServerConfiguration> {
        self.provider.current()
    }

    /// Launch configuration for the client.
    pub fn handshake(&self) -> SidecarHandshake {
        SidecarHandshake::new(&self.provider.current(), &self.analyzer_property_keys)
    }

    /// Address the listener is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Number of analyses currently registered.
    pub fn in_flight_analyses(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Number of open client connections.
    pub fn open_connections(&self) -> usize {
        self.connections.active_connections()
    }
}

impl Drop for AnalysisServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AnalysisServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisServer")
            .field("state", &self.state())
            .field("configuration", &self.provider.current())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: RequestHandler,
    shutdown: CancellationToken,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, peer, handler, shutdown).await {
                                tracing::debug!(%peer, error = %err, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "failed to accept connection");
                    }
                }
            }

            () = shutdown.cancelled() => {
                tracing::debug!("accept loop stopping");
                break;
            }
        }
    }

    drop(listener);

    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, tracker.wait_for_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            open_connections = tracker.active_connections(),
            "connections still open after shutdown"
        );
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    handler: RequestHandler,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req, Some(peer)).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);

    tokio::select! {
        result = conn => result,
        () = shutdown.cancelled() => {
            tracing::debug!(%peer, "connection closed by shutdown");
            Ok(())
        }
    }
}

/// Builder for [`AnalysisServer`].
pub struct AnalysisServerBuilder {
    engine: Arc<dyn AnalysisEngine>,
    limits: ServerLimits,
    factory: Arc<dyn ListenerFactory>,
    analyzer_property_keys: Vec<String>,
}

impl AnalysisServerBuilder {
    /// Creates a builder with default limits and the loopback listener.
    pub fn new(engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            engine,
            limits: ServerLimits::default(),
            factory: Arc::new(LoopbackListenerFactory::new()),
            analyzer_property_keys: Vec::new(),
        }
    }

    /// Sets the limits.
    #[must_use]
    pub fn limits(mut self, limits: ServerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the number of bind attempts.
    #[must_use]
    pub fn max_start_attempts(mut self, attempts: u32) -> Self {
        self.limits.max_start_attempts = attempts;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.limits.request_timeout = timeout;
        self
    }

    /// Replaces the listener factory.
    #[must_use]
    pub fn listener_factory(mut self, factory: Arc<dyn ListenerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Sets the analyzer property keys handed out in the handshake.
    #[must_use]
    pub fn analyzer_property_keys(mut self, keys: Vec<String>) -> Self {
        self.analyzer_property_keys = keys;
        self
    }

    /// Builds the server and issues its first credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the limits are invalid.
    pub fn build(self) -> ServerResult<AnalysisServer> {
        let provider = Arc::new(CredentialProvider::new(self.limits.clone())?);
        let dispatcher = Arc::new(AnalysisDispatcher::new(self.engine, &self.limits));
        let handler = RequestHandler::new(Arc::clone(&provider), Arc::clone(&dispatcher));

        Ok(AnalysisServer {
            provider,
            factory: self.factory,
            dispatcher,
            handler,
            analyzer_property_keys: self.analyzer_property_keys,
            state: RwLock::new(ServerState::Stopped),
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            local_addr: RwLock::new(None),
            connections: ConnectionTracker::new(),
            accept_task: Mutex::new(None),
        })
    }
}
