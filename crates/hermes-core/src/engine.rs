//! The seam to the analysis engine.
//!
//! The engine itself lives outside this workspace. Hermes only needs to ask
//! whether it is ready and to run one job with a cooperative cancellation
//! token.

use std::future::Future;
use std::pin::Pin;

pub use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;
use crate::model::{AnalysisRequest, Diagnostic};

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An analysis engine that Hermes dispatches jobs to.
///
/// The returned future is `'static` because the dispatcher runs it on its own
/// task: when a job is cancelled or times out, the dispatcher stops waiting
/// for it but lets the engine wind down cooperatively through `cancel`.
///
/// # Example
///
/// ```rust
/// use hermes_core::{AnalysisEngine, AnalysisRequest, BoxFuture, CancellationToken, Diagnostic, EngineResult};
///
/// struct NoIssues;
///
/// impl AnalysisEngine for NoIssues {
///     fn analyze(
///         &self,
///         _request: AnalysisRequest,
///         _cancel: CancellationToken,
///     ) -> BoxFuture<'static, EngineResult<Vec<Diagnostic>>> {
///         Box::pin(async { Ok(Vec::new()) })
///     }
/// }
/// ```
pub trait AnalysisEngine: Send + Sync + 'static {
    /// Returns `true` once the engine can accept work.
    fn is_ready(&self) -> bool {
        true
    }

    /// Runs one analysis job.
    ///
    /// Implementations should poll `cancel` at convenient points and return
    /// [`EngineError::Cancelled`](crate::EngineError::Cancelled) once it fires.
    fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, EngineResult<Vec<Diagnostic>>>;
}
