//! Hermes server - loopback RPC host for an out-of-process analysis engine
//!
//! The host application starts an [`AnalysisServer`], hands the resulting
//! [`SidecarHandshake`] (port and secret token) to its client, and from then
//! on the client submits analysis jobs and cancels them by id over plain HTTP
//! on `127.0.0.1`.
//!
//! # Architecture
//!
//! ```text
//!   client ──HTTP──► accept loop ──► RequestHandler
//!                                      │ validate (loopback, X-Auth-Token, route, size)
//!                                      │ read body (size cap, timeout)
//!                                      │ decode (closed schema types)
//!                                      ▼
//!                                  AnalysisDispatcher ──► AnalysisEngine
//!                                      ▲ (in-flight map, slots, per-job tokens)
//!                    POST /cancel ─────┘
//! ```
//!
//! - [`credentials`]: random port and token, swapped atomically on rotation
//! - [`listener`]: loopback-only listeners behind a factory seam
//! - [`validation`]: the ordered request checks
//! - [`dispatcher`]: job registry, cancellation and concurrency ceiling
//! - [`server`]: startup with credential rotation, accept loop, shutdown
//! - [`config`]: file and environment configuration
//!
//! # Routes
//!
//! | Route | Body | Success |
//! |-------|------|---------|
//! | `POST /analyze` | `{"FileUris":[..],"ActiveRules":[..],"AnalysisId":".."}` | `200 {"Diagnostics":[..]}` |
//! | `POST /cancel` | `{"AnalysisId":".."}` | `200 {"Cancelled":bool}` |
//!
//! Failures: `400`, `401`, `403`, `408`, `413`, `500`, `503`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hermes_core::fixtures::StaticEngine;
//! use hermes_server::{AnalysisServer, HermesConfig};
//!
//! # async fn example() -> Result<(), hermes_server::ServerError> {
//! let config = HermesConfig::default().with_env_overrides();
//! let server = AnalysisServer::from_config(&config, Arc::new(StaticEngine::new()))?;
//! server.start().await?;
//!
//! let handshake = server.handshake().to_json().map_err(|e| hermes_server::ServerError::config(e.to_string()))?;
//! // hand `handshake` to the client process
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod listener;
pub mod server;
pub mod shutdown;
pub mod validation;

pub use config::{HermesConfig, HermesConfigBuilder};
pub use credentials::{AuthToken, CredentialProvider, ServerConfiguration, ServerLimits};
pub use dispatcher::AnalysisDispatcher;
pub use error::{DispatchError, ErrorResponse, ListenerError, ServerError, ServerResult};
pub use handler::RequestHandler;
pub use handshake::SidecarHandshake;
pub use listener::{BoundListener, ListenerFactory, LoopbackListenerFactory};
pub use server::{AnalysisServer, AnalysisServerBuilder, ServerState};
pub use validation::{validate, Rejection, ValidationOutcome, AUTH_TOKEN_HEADER};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
