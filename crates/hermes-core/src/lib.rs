//! # Hermes Core
//!
//! Core types and traits shared by the Hermes loopback analysis server.
//!
//! This crate provides the foundational types used throughout Hermes:
//!
//! - [`AnalysisRequest`] / [`CancellationRequest`] - The two request payloads
//! - [`AnalysisId`] - Caller-supplied correlation id for an analysis job
//! - [`Diagnostic`] - A single finding reported by the analysis engine
//! - [`codec`] - Strict JSON decoding bound to closed schema types
//! - [`AnalysisEngine`] - The seam to the out-of-process analysis engine
//!
//! ## Wire format
//!
//! Payloads are plain JSON with `PascalCase` member names:
//!
//! ```text
//! POST /analyze  {"FileUris":["file:///a.cs"],"ActiveRules":[{"RuleId":"S101"}],"AnalysisId":"<guid>"}
//! POST /cancel   {"AnalysisId":"<guid>"}
//! 200 OK         {"Diagnostics":[{"Id":"S101","Message":"...","FileUri":"file:///a.cs"}]}
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod codec;
mod engine;
mod error;
pub mod fixtures;
mod model;

pub use codec::{decode_analysis_request, decode_cancellation_request, encode};
pub use engine::{AnalysisEngine, BoxFuture, CancellationToken};
pub use error::{CodecError, CodecResult, EngineError, EngineResult};
pub use model::{
    ActiveRule, AnalysisId, AnalysisRequest, AnalysisResponse, CancellationRequest,
    CancellationResponse, Diagnostic, RequestType, TextRange,
};
