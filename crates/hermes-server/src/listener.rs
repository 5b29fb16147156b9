//! Loopback listeners.
//!
//! Listeners bind `127.0.0.1` and nothing else. The bind step sits behind
//! [`ListenerFactory`] so the server host can be driven against failing binds.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use hermes_core::BoxFuture;
use tokio::net::TcpListener;

use crate::error::ListenerError;

/// Returns the listener prefix for a port.
///
/// ```rust
/// assert_eq!(hermes_server::listener::prefix_for(8080), "http://127.0.0.1:8080/");
/// ```
pub fn prefix_for(port: u16) -> String {
    format!("http://{}:{port}/", Ipv4Addr::LOCALHOST)
}

/// A listener bound to a loopback port.
#[derive(Debug)]
pub struct BoundListener {
    listener: TcpListener,
    port: u16,
}

impl BoundListener {
    /// Wraps an already bound socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not bound to IPv4 loopback.
    pub fn from_tcp(listener: TcpListener) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        if addr.ip() != Ipv4Addr::LOCALHOST {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("listener is bound to {addr}, not loopback"),
            ));
        }
        Ok(Self {
            listener,
            port: addr.port(),
        })
    }

    /// Port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Listener prefix, `http://127.0.0.1:<port>/`.
    pub fn prefix(&self) -> String {
        prefix_for(self.port)
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    pub(crate) fn into_inner(self) -> TcpListener {
        self.listener
    }
}

/// Creates listeners for the server host.
pub trait ListenerFactory: Send + Sync + 'static {
    /// Binds a listener on `127.0.0.1:<port>`.
    fn create(&self, port: u16) -> BoxFuture<'_, Result<BoundListener, ListenerError>>;
}

/// The production factory: binds a TCP socket on IPv4 loopback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackListenerFactory;

impl LoopbackListenerFactory {
    /// Creates the factory.
    pub fn new() -> Self {
        Self
    }
}

impl ListenerFactory for LoopbackListenerFactory {
    fn create(&self, port: u16) -> BoxFuture<'_, Result<BoundListener, ListenerError>> {
        Box::pin(async move {
            // Port 0 would let the OS pick, and the issued port would be a lie.
            if port == 0 {
                return Err(ListenerError::Bind {
                    port,
                    source: io::Error::new(io::ErrorKind::InvalidInput, "port 0 is not allowed"),
                });
            }

            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
                .await
                .map_err(|source| {
                    if source.kind() == io::ErrorKind::AddrInUse {
                        ListenerError::AddressInUse { port }
                    } else {
                        ListenerError::Bind { port, source }
                    }
                })?;

            tracing::debug!(port, "listener bound");
            Ok(BoundListener { listener, port })
        })
    }
}
