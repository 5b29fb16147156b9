//! Analysis dispatch.
//!
//! The [`AnalysisDispatcher`] hands decoded requests to the engine, keeps one
//! cancellation token per in-flight analysis id, and bounds how many analyses
//! run at once.
//!
//! A job is registered before it waits for a concurrency slot, so a cancel
//! arriving while the job is queued still finds it. Registration is removed
//! exactly once when the job resolves, whatever the outcome.
//!
//! Cancellation is cooperative. The dispatcher resolves its own side promptly
//! and leaves the engine future running until it observes its token; that
//! future keeps holding its slot until it does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hermes_core::{
    AnalysisEngine, AnalysisId, AnalysisRequest, CancellationToken, Diagnostic, EngineError,
};
use hermes_telemetry::metrics::{record_analysis, InFlightGuard};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::credentials::ServerLimits;
use crate::error::DispatchError;

/// Result of a dispatched analysis.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug)]
struct JobHandle {
    generation: u64,
    token: CancellationToken,
}

/// Routes analyses to the engine and tracks them by id.
pub struct AnalysisDispatcher {
    engine: Arc<dyn AnalysisEngine>,
    slots: Arc<Semaphore>,
    jobs: Arc<DashMap<AnalysisId, JobHandle>>,
    generation: AtomicU64,
    request_timeout: Duration,
}

impl AnalysisDispatcher {
    /// Creates a dispatcher with the concurrency ceiling and timeout from
    /// `limits`.
    pub fn new(engine: Arc<dyn AnalysisEngine>, limits: &ServerLimits) -> Self {
        Self {
            engine,
            slots: Arc::new(Semaphore::new(limits.max_concurrent_requests)),
            jobs: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            request_timeout: limits.request_timeout,
        }
    }

    /// Runs an analysis to completion.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::EngineNotReady`] if the engine is still loading
    /// - [`DispatchError::DuplicateAnalysisId`] if the id is already in flight
    /// - [`DispatchError::Cancelled`] if the job was cancelled
    /// - [`DispatchError::Timeout`] if no slot freed up, or the engine did not
    ///   finish, within the request timeout
    /// - [`DispatchError::Engine`] if the engine failed
    pub async fn start_analysis(&self, request: AnalysisRequest) -> DispatchResult<Vec<Diagnostic>> {
        if !self.engine.is_ready() {
            warn!(analysis_id = %request.analysis_id, "analysis refused: engine not ready");
            return Err(DispatchError::EngineNotReady);
        }

        let id = request.analysis_id;
        let registration = self.register(id)?;
        let token = registration.token.clone();
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.request_timeout;

        info!(analysis_id = %id, files = request.file_uris.len(), "analysis started");

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(DispatchError::Cancelled),
            () = tokio::time::sleep_until(deadline) => {
                token.cancel();
                Err(DispatchError::Timeout)
            }
            result = self.run(request, token.clone()) => result,
        };

        drop(registration);

        let elapsed = started.elapsed();
        match &result {
            Ok(diagnostics) => {
                record_analysis("completed", elapsed);
                info!(
                    analysis_id = %id,
                    diagnostics = diagnostics.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "analysis completed"
                );
            }
            Err(err @ DispatchError::Engine { .. }) => {
                record_analysis(err.category(), elapsed);
                error!(analysis_id = %id, error = %err, "analysis failed");
            }
            Err(err) => {
                record_analysis(err.category(), elapsed);
                info!(
                    analysis_id = %id,
                    outcome = err.category(),
                    duration_ms = elapsed.as_millis() as u64,
                    "analysis ended without diagnostics"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        request: AnalysisRequest,
        token: CancellationToken,
    ) -> DispatchResult<Vec<Diagnostic>> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Cancelled)?;

        let job = self.engine.analyze(request, token);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            job.await
        });

        match handle.await {
            Ok(Ok(diagnostics)) => Ok(diagnostics),
            Ok(Err(EngineError::Cancelled)) => Err(DispatchError::Cancelled),
            Ok(Err(EngineError::NotReady)) => Err(DispatchError::EngineNotReady),
            Ok(Err(EngineError::Failed { message })) => Err(DispatchError::Engine { message }),
            Err(join_error) => Err(DispatchError::Engine {
                message: join_error.to_string(),
            }),
        }
    }

    fn register(&self, id: AnalysisId) -> DispatchResult<JobRegistration> {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => {
                warn!(analysis_id = %id, "analysis id already in flight");
                Err(DispatchError::DuplicateAnalysisId)
            }
            Entry::Vacant(vacant) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let token = CancellationToken::new();
                vacant.insert(JobHandle {
                    generation,
                    token: token.clone(),
                });
                Ok(JobRegistration {
                    jobs: Arc::clone(&self.jobs),
                    id,
                    generation,
                    token,
                    _in_flight: InFlightGuard::new(),
                })
            }
        }
    }

    /// Signals the job registered under `id`.
    ///
    /// Returns `false`, and does nothing, if no such job is in flight. A
    /// cancel that arrives before its analysis is registered is dropped.
    pub fn cancel(&self, id: AnalysisId) -> bool {
        let token = self.jobs.get(&id).map(|handle| handle.token.clone());
        match token {
            Some(token) => {
                token.cancel();
                info!(analysis_id = %id, "analysis cancellation requested");
                true
            }
            None => {
                debug!(analysis_id = %id, "cancel for unknown analysis ignored");
                false
            }
        }
    }

    /// Signals every in-flight job. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> =
            self.jobs.iter().map(|entry| entry.token.clone()).collect();
        for token in &tokens {
            token.cancel();
        }
        tokens.len()
    }

    /// Number of registered jobs.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` if a job is registered under `id`.
    pub fn is_in_flight(&self, id: AnalysisId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Concurrency slots not currently held by a running engine future.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl std::fmt::Debug for AnalysisDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDispatcher")
            .field("in_flight", &self.jobs.len())
            .field("available_slots", &self.slots.available_permits())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Removes its job from the map when dropped, unless the entry has since been
/// replaced by a later registration.
struct JobRegistration {
    jobs: Arc<DashMap<AnalysisId, JobHandle>>,
    id: AnalysisId,
    generation: u64,
    token: CancellationToken,
    _in_flight: InFlightGuard,
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        let generation = self.generation;
        self.jobs
            .remove_if(&self.id, |_, handle| handle.generation == generation);
    }
}
