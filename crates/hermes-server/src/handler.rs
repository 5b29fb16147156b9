//! Per-request handling: validate, read the body, decode, dispatch, answer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use hermes_core::codec::{self, check_charset};
use hermes_core::{AnalysisResponse, CancellationResponse, CodecError, RequestType};
use hermes_telemetry::metrics::{record_rejection, record_request};
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use tracing::{debug, info, warn, Instrument};

use crate::credentials::{CredentialProvider, ServerConfiguration};
use crate::dispatcher::AnalysisDispatcher;
use crate::error::{DispatchError, ErrorResponse};
use crate::validation::validate;

/// Boxed error type of request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turns HTTP requests into dispatcher calls.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    provider: Arc<CredentialProvider>,
    dispatcher: Arc<AnalysisDispatcher>,
}

impl RequestHandler {
    /// Creates a handler over the given provider and dispatcher.
    pub fn new(provider: Arc<CredentialProvider>, dispatcher: Arc<AnalysisDispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
        }
    }

    /// Answers one request. Never fails: every outcome is a response.
    pub async fn handle<B>(&self, request: Request<B>, peer: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let span = tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            peer = %peer.map_or_else(|| "-".to_string(), |p| p.to_string()),
        );

        async move {
            let start = Instant::now();
            let config = self.provider.current();
            let outcome = validate(&request, peer, &config);
            let route = outcome.request_type().as_str();

            let response = match outcome.into_result() {
                Ok(request_type) => self.route(request_type, request, &config).await,
                Err(rejection) => {
                    record_rejection(rejection.as_str());
                    error_response(
                        rejection.status_code(),
                        &ErrorResponse::new(rejection.as_str(), rejection.to_string()),
                    )
                }
            };

            record_request(route, response.status().as_u16());
            info!(
                status = response.status().as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn route<B>(
        &self,
        request_type: RequestType,
        request: Request<B>,
        config: &ServerConfiguration,
    ) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        if let Err(err) = check_charset(request.headers().get(header::CONTENT_TYPE)) {
            return codec_error_response(&err);
        }

        let body = match read_body(request, config).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        match request_type {
            RequestType::Analyze => {
                let analysis = match codec::decode_analysis_request(&body) {
                    Ok(analysis) => analysis,
                    Err(err) => return codec_error_response(&err),
                };
                match self.dispatcher.start_analysis(analysis).await {
                    Ok(diagnostics) => json_response(StatusCode::OK, &AnalysisResponse { diagnostics }),
                    Err(DispatchError::Cancelled) => {
                        json_response(StatusCode::OK, &AnalysisResponse::default())
                    }
                    Err(err) => error_response(err.status_code(), &ErrorResponse::from(&err)),
                }
            }
            RequestType::Cancel => {
                let cancellation = match codec::decode_cancellation_request(&body) {
                    Ok(cancellation) => cancellation,
                    Err(err) => return codec_error_response(&err),
                };
                let cancelled = self.dispatcher.cancel(cancellation.analysis_id);
                json_response(StatusCode::OK, &CancellationResponse { cancelled })
            }
            RequestType::Unknown => error_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse::new("bad_request", "unknown route"),
            ),
        }
    }
}

/// Reads the whole body, bounded in size and time.
async fn read_body<B>(
    request: Request<B>,
    config: &ServerConfiguration,
) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<BoxError>,
{
    let limits = config.limits();
    let limit = usize::try_from(limits.max_request_body_bytes).unwrap_or(usize::MAX);
    let body = Limited::new(request.into_body(), limit);

    match tokio::time::timeout(limits.request_timeout, body.collect()).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit = limits.max_request_body_bytes, "streamed body exceeds configured limit");
            record_rejection("payload_too_large");
            Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                &ErrorResponse::new(
                    "payload_too_large",
                    format!(
                        "request body exceeds limit of {} bytes",
                        limits.max_request_body_bytes
                    ),
                ),
            ))
        }
        Ok(Err(err)) => {
            debug!(error = %err, "failed to read request body");
            Err(error_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse::new("bad_request", "failed to read request body"),
            ))
        }
        Err(_) => {
            warn!(
                timeout_ms = limits.request_timeout.as_millis() as u64,
                "request body was not received in time"
            );
            Err(error_response(
                StatusCode::REQUEST_TIMEOUT,
                &ErrorResponse::new("timeout", "request body was not received in time"),
            ))
        }
    }
}

fn codec_error_response(err: &CodecError) -> Response<Full<Bytes>> {
    debug!(error = %err, category = err.category(), "request body rejected");
    record_rejection("decode");
    error_response(
        StatusCode::BAD_REQUEST,
        &ErrorResponse::new(err.category(), err.to_string()),
    )
}

fn error_response(status: StatusCode, body: &ErrorResponse) -> Response<Full<Bytes>> {
    json_response(status, body)
}

/// Create a JSON response.
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, bytes) = match codec::encode(body) {
        Ok(bytes) => (status, bytes),
        Err(err) => {
            warn!(error = %err, "failed to encode response");
            (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from_static(b"{}"))
        }
    };

    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}
