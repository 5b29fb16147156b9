//! Test fixtures for Hermes development and testing.
//!
//! This module provides canned payloads and scripted engines that can be used
//! in tests across the Hermes workspace.
//!
//! # Example
//!
//! ```
//! use hermes_core::{codec, fixtures};
//!
//! let request = codec::decode_analysis_request(fixtures::ANALYZE_BODY.as_bytes()).unwrap();
//! assert_eq!(request.analysis_id, fixtures::analysis_id());
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

use crate::engine::{AnalysisEngine, BoxFuture, CancellationToken};
use crate::error::{EngineError, EngineResult};
use crate::model::{AnalysisId, AnalysisRequest, Diagnostic};

/// The GUID used by [`ANALYZE_BODY`] and [`CANCEL_BODY`].
pub const ANALYSIS_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

/// A well-formed `POST /analyze` body with one file and one rule.
pub const ANALYZE_BODY: &str = r#"{"FileUris":["file:///c:/src/Program.cs"],"ActiveRules":[{"RuleId":"S101"}],"AnalysisId":"0f8fad5b-d9cb-469f-a165-70867728950e"}"#;

/// A well-formed `POST /cancel` body for [`ANALYSIS_ID`].
pub const CANCEL_BODY: &str = r#"{"AnalysisId":"0f8fad5b-d9cb-469f-a165-70867728950e"}"#;

/// A body that smuggles a .NET object-provider gadget through a type hint.
pub const GADGET_BODY: &str = r#"{"$type":"System.Windows.Data.ObjectDataProvider, PresentationFramework","MethodName":"Start","MethodParameters":{"$type":"System.Collections.ArrayList, mscorlib","$values":["cmd","/c calc"]},"ObjectInstance":{"$type":"System.Diagnostics.Process, System"}}"#;

/// Returns [`ANALYSIS_ID`] parsed.
///
/// # Panics
///
/// Never; the constant is a valid GUID.
#[must_use]
pub fn analysis_id() -> AnalysisId {
    ANALYSIS_ID.parse().expect("fixture GUID is valid")
}

/// Builds an analysis request for one file with a fresh id.
///
/// # Panics
///
/// Panics if `file` is not an absolute URI.
#[must_use]
pub fn analysis_request(file: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        [Url::parse(file).expect("fixture URI is valid")],
        [crate::ActiveRule::new("S101")],
        AnalysisId::new(),
    )
}

/// Serializes a request into an `/analyze` body.
///
/// # Panics
///
/// Never for values built by this module.
#[must_use]
pub fn analyze_body(request: &AnalysisRequest) -> String {
    serde_json::to_string(request).expect("request serializes")
}

/// An engine that reports one diagnostic per file after an optional delay.
#[derive(Debug, Clone, Default)]
pub struct StaticEngine {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    not_ready: Arc<AtomicBool>,
}

impl StaticEngine {
    /// Creates an engine that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of jobs the engine has been asked to run.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Toggles readiness.
    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }
}

impl AnalysisEngine for StaticEngine {
    fn is_ready(&self) -> bool {
        !self.not_ready.load(Ordering::SeqCst)
    }

    fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, EngineResult<Vec<Diagnostic>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
            Ok(request
                .file_uris
                .into_iter()
                .map(|uri| Diagnostic::new("S101", "Rename this identifier.", uri))
                .collect())
        })
    }
}

/// An engine that never finishes until its job is cancelled, recording which
/// jobs observed cancellation.
#[derive(Debug, Clone, Default)]
pub struct PendingEngine {
    started: Arc<AtomicUsize>,
    cancelled: Arc<Mutex<Vec<AnalysisId>>>,
}

impl PendingEngine {
    /// Creates the engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs that have started running.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Ids of the jobs that observed their cancellation token.
    #[must_use]
    pub fn cancelled_ids(&self) -> Vec<AnalysisId> {
        self.cancelled.lock().clone()
    }
}

impl AnalysisEngine for PendingEngine {
    fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, EngineResult<Vec<Diagnostic>>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let log = Arc::clone(&self.cancelled);
        Box::pin(async move {
            cancel.cancelled().await;
            log.lock().push(request.analysis_id);
            Err(EngineError::Cancelled)
        })
    }
}

/// An engine whose jobs always fail.
#[derive(Debug, Clone, Default)]
pub struct FailingEngine;

impl AnalysisEngine for FailingEngine {
    fn analyze(
        &self,
        _request: AnalysisRequest,
        _cancel: CancellationToken,
    ) -> BoxFuture<'static, EngineResult<Vec<Diagnostic>>> {
        Box::pin(async { Err(EngineError::failed("compilation could not be loaded")) })
    }
}
