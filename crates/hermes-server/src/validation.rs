//! Request validation.
//!
//! Every request passes through [`validate`] before its body is read. The
//! checks run in a fixed order and stop at the first failure:
//!
//! 1. the peer must be loopback (`127.0.0.1` or `::1`), else **403**
//! 2. `X-Auth-Token` must carry exactly the current token, else **401**
//! 3. the request must be `POST /analyze` or `POST /cancel`, else **400**
//! 4. a declared `Content-Length` must not exceed the body limit, else **413**
//!
//! Validation reads the request and the configuration and changes neither.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use hermes_core::RequestType;
use http::{header, Method, Request, StatusCode};
use tracing::{debug, warn};

use crate::credentials::ServerConfiguration;

/// Header carrying the secret token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The peer is not a loopback address.
    Forbidden,
    /// The token is missing, repeated or wrong.
    Unauthorized,
    /// Wrong method, unknown path or unreadable `Content-Length`.
    BadRequest,
    /// The declared body is larger than the limit.
    PayloadTooLarge {
        /// Declared `Content-Length`.
        declared: u64,
        /// Configured limit.
        limit: u64,
    },
}

impl Rejection {
    /// Get the HTTP status code for this rejection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::BadRequest => "bad_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden => f.write_str("requests are only accepted from loopback"),
            Self::Unauthorized => f.write_str("missing or invalid X-Auth-Token"),
            Self::BadRequest => f.write_str("expected POST /analyze or POST /cancel"),
            Self::PayloadTooLarge { declared, limit } => {
                write!(f, "request body of {declared} bytes exceeds limit of {limit} bytes")
            }
        }
    }
}

/// Result of validating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    request_type: RequestType,
    rejection: Option<Rejection>,
}

impl ValidationOutcome {
    fn accepted(request_type: RequestType) -> Self {
        Self {
            request_type,
            rejection: None,
        }
    }

    fn rejected(request_type: RequestType, rejection: Rejection) -> Self {
        Self {
            request_type,
            rejection: Some(rejection),
        }
    }

    /// Returns `true` if every check passed.
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }

    /// Request type derived from the path.
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// The failed check, if any.
    pub fn rejection(&self) -> Option<Rejection> {
        self.rejection
    }

    /// Converts into the accepted route or the rejection.
    pub fn into_result(self) -> Result<RequestType, Rejection> {
        match self.rejection {
            None => Ok(self.request_type),
            Some(rejection) => Err(rejection),
        }
    }
}

/// Returns `true` for `127.0.0.1`, `::1`, and `127.0.0.1` mapped into IPv6.
pub fn is_loopback_peer(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => {
            v6 == Ipv6Addr::LOCALHOST || v6.to_ipv4_mapped() == Some(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Validates a request against the current configuration.
pub fn validate<B>(
    request: &Request<B>,
    peer: Option<SocketAddr>,
    config: &ServerConfiguration,
) -> ValidationOutcome {
    let request_type = RequestType::from_path(request.uri().path());

    match peer {
        Some(peer) if is_loopback_peer(peer.ip()) => {}
        Some(peer) => {
            warn!(%peer, "request from non-loopback peer rejected");
            return ValidationOutcome::rejected(request_type, Rejection::Forbidden);
        }
        None => {
            warn!("request without peer address rejected");
            return ValidationOutcome::rejected(request_type, Rejection::Forbidden);
        }
    }

    if !has_valid_token(request, config) {
        warn!("request with missing or invalid auth token rejected");
        return ValidationOutcome::rejected(request_type, Rejection::Unauthorized);
    }

    if request.method() != Method::POST || request_type == RequestType::Unknown {
        debug!(
            method = %request.method(),
            path = request.uri().path(),
            "request for unknown route rejected"
        );
        return ValidationOutcome::rejected(request_type, Rejection::BadRequest);
    }

    let limit = config.limits().max_request_body_bytes;
    if let Some(value) = request.headers().get(header::CONTENT_LENGTH) {
        let Some(declared) = value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) else {
            debug!("request with unparsable content-length rejected");
            return ValidationOutcome::rejected(request_type, Rejection::BadRequest);
        };
        if declared > limit {
            warn!(declared, limit, "request body exceeds configured limit");
            return ValidationOutcome::rejected(
                request_type,
                Rejection::PayloadTooLarge { declared, limit },
            );
        }
    }

    ValidationOutcome::accepted(request_type)
}

fn has_valid_token<B>(request: &Request<B>, config: &ServerConfiguration) -> bool {
    let mut values = request.headers().get_all(AUTH_TOKEN_HEADER).iter();
    match (values.next(), values.next()) {
        (Some(value), None) => config.token().matches(value.as_bytes()),
        _ => false,
    }
}
