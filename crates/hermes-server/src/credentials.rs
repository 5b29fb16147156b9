//! Port and token issuance.
//!
//! The [`CredentialProvider`] owns the current [`ServerConfiguration`]: a
//! random high port plus a random secret token, together with the limits the
//! server enforces. A configuration is never mutated. When the listener cannot
//! bind, [`CredentialProvider::regenerate`] swaps in a wholly new one, and
//! callers detect the change by pointer identity:
//!
//! ```rust
//! use std::sync::Arc;
//! use hermes_server::credentials::{CredentialProvider, ServerLimits};
//!
//! let provider = CredentialProvider::new(ServerLimits::default()).unwrap();
//! let first = provider.current();
//! let second = provider.regenerate();
//!
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert_ne!(first.port(), second.port());
//! assert!(Arc::ptr_eq(&second, &provider.current()));
//! ```

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;

use crate::error::{ServerError, ServerResult};
use crate::listener::prefix_for;

/// Raw length of a token before base64 encoding.
pub const TOKEN_BYTES: usize = 32;

/// First port of the default range (IANA dynamic/private ports).
pub const DEFAULT_PORT_RANGE_START: u16 = 49152;

/// Last port of the default range.
pub const DEFAULT_PORT_RANGE_END: u16 = 65535;

/// The secret a client must present in `X-Auth-Token`.
///
/// Only the provider creates tokens. `Debug` is redacted and there is no
/// `Display`, so a token cannot end up in a log line by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    fn generate() -> Self {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        Self(STANDARD.encode(raw).into())
    }

    /// Compares a presented header value against the token in constant time.
    pub fn matches(&self, presented: &[u8]) -> bool {
        self.0.as_bytes().ct_eq(presented).into()
    }

    /// Returns the encoded token, for handing to the client out of band.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Limits fixed for the lifetime of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLimits {
    /// How many binds `start` tries before faulting.
    pub max_start_attempts: u32,
    /// Bound on reading a body, waiting for a slot and running a job.
    pub request_timeout: Duration,
    /// Largest body accepted, declared or streamed.
    pub max_request_body_bytes: u64,
    /// Number of analyses the engine runs at once.
    pub max_concurrent_requests: usize,
    /// Ports the provider draws from.
    pub port_range: RangeInclusive<u16>,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_start_attempts: 3,
            request_timeout: Duration::from_secs(30),
            max_request_body_bytes: 10 * 1024 * 1024, // 10MB
            max_concurrent_requests: 4,
            port_range: DEFAULT_PORT_RANGE_START..=DEFAULT_PORT_RANGE_END,
        }
    }
}

impl ServerLimits {
    /// Validate the limits.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_start_attempts == 0 {
            return Err(ServerError::config("max_start_attempts must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ServerError::config("request_timeout must be positive"));
        }
        if self.max_request_body_bytes == 0 {
            return Err(ServerError::config("max_request_body_bytes must be positive"));
        }
        if self.max_concurrent_requests == 0
            || self.max_concurrent_requests > tokio::sync::Semaphore::MAX_PERMITS
        {
            return Err(ServerError::config(format!(
                "max_concurrent_requests must be between 1 and {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        if self.port_range.is_empty() {
            return Err(ServerError::config("port range is empty"));
        }
        if *self.port_range.start() < 1024 {
            return Err(ServerError::config(
                "port range must not include privileged ports",
            ));
        }
        Ok(())
    }
}

/// An issued port and token, with the limits in force.
#[derive(Clone)]
pub struct ServerConfiguration {
    port: u16,
    token: AuthToken,
    limits: ServerLimits,
}

impl ServerConfiguration {
    /// Port the listener binds.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Token clients must present.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Limits in force.
    pub fn limits(&self) -> &ServerLimits {
        &self.limits
    }

    /// Listener prefix, `http://127.0.0.1:<port>/`.
    pub fn prefix(&self) -> String {
        prefix_for(self.port)
    }
}

impl fmt::Debug for ServerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfiguration")
            .field("port", &self.port)
            .field("token", &self.token)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Issues configurations and replaces them atomically.
pub struct CredentialProvider {
    current: ArcSwap<ServerConfiguration>,
    limits: ServerLimits,
}

impl CredentialProvider {
    /// Creates a provider and issues the first configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the limits are invalid.
    pub fn new(limits: ServerLimits) -> ServerResult<Self> {
        limits.validate()?;
        let first = issue(&limits, None);
        Ok(Self {
            current: ArcSwap::from_pointee(first),
            limits,
        })
    }

    /// Returns the configuration in force.
    pub fn current(&self) -> Arc<ServerConfiguration> {
        self.current.load_full()
    }

    /// Replaces the current configuration with a new port and token.
    ///
    /// The new port differs from the one it replaces whenever the range has
    /// more than one port.
    pub fn regenerate(&self) -> Arc<ServerConfiguration> {
        loop {
            let previous = self.current.load_full();
            let next = Arc::new(issue(&self.limits, Some(&*previous)));
            let swapped = self.current.compare_and_swap(&previous, Arc::clone(&next));
            if Arc::ptr_eq(&*swapped, &previous) {
                tracing::debug!(
                    previous_port = previous.port(),
                    port = next.port(),
                    "credentials regenerated"
                );
                return next;
            }
        }
    }

    /// Limits every issued configuration carries.
    pub fn limits(&self) -> &ServerLimits {
        &self.limits
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("current", &self.current.load_full())
            .finish_non_exhaustive()
    }
}

fn issue(limits: &ServerLimits, previous: Option<&ServerConfiguration>) -> ServerConfiguration {
    let port = draw_port(&limits.port_range, previous.map(ServerConfiguration::port));
    let mut token = AuthToken::generate();
    while previous.is_some_and(|p| p.token == token) {
        token = AuthToken::generate();
    }
    ServerConfiguration {
        port,
        token,
        limits: limits.clone(),
    }
}

fn draw_port(range: &RangeInclusive<u16>, previous: Option<u16>) -> u16 {
    let mut rng = rand::thread_rng();
    if range.start() == range.end() {
        return *range.start();
    }
    loop {
        let port = rng.gen_range(range.clone());
        if Some(port) != previous {
            return port;
        }
    }
}
