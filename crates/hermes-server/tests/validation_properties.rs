//! Property tests for the request checks.

mod common;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use common::LogCapture;
use hermes_core::fixtures::{self, StaticEngine};
use hermes_core::RequestType;
use hermes_server::validation::is_loopback_peer;
use hermes_server::{
    validate, AnalysisDispatcher, CredentialProvider, Rejection, RequestHandler,
    ServerConfiguration, ServerLimits, AUTH_TOKEN_HEADER,
};
use http::{header, Method, Request, StatusCode};
use http_body_util::Full;
use proptest::prelude::*;

const LIMIT: u64 = 4096;

fn config() -> Arc<ServerConfiguration> {
    let limits = ServerLimits {
        max_request_body_bytes: LIMIT,
        ..ServerLimits::default()
    };
    CredentialProvider::new(limits).unwrap().current()
}

fn loopback() -> Option<SocketAddr> {
    Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 50123)))
}

fn request(config: &ServerConfiguration) -> http::request::Builder {
    Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(AUTH_TOKEN_HEADER, config.token().expose())
}

fn non_loopback_ip() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|octets| IpAddr::V4(Ipv4Addr::from(octets))),
        any::<[u8; 16]>().prop_map(|octets| IpAddr::V6(Ipv6Addr::from(octets))),
    ]
    .prop_filter("loopback peers are accepted", |ip| !is_loopback_peer(*ip))
}

proptest! {
    #[test]
    fn test_non_loopback_peers_are_forbidden(ip in non_loopback_ip(), port in 1u16..) {
        let config = config();
        let request = request(&config).body(()).unwrap();

        let outcome = validate(&request, Some(SocketAddr::new(ip, port)), &config);

        prop_assert_eq!(outcome.rejection(), Some(Rejection::Forbidden));
    }

    #[test]
    fn test_wrong_token_is_unauthorized(token in "[A-Za-z0-9+/=]{0,64}") {
        let config = config();
        prop_assume!(token != config.token().expose());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/analyze")
            .header(AUTH_TOKEN_HEADER, token)
            .body(())
            .unwrap();

        let outcome = validate(&request, loopback(), &config);

        prop_assert_eq!(outcome.rejection(), Some(Rejection::Unauthorized));
    }

    #[test]
    fn test_token_under_other_header_is_unauthorized(name in "x-[a-z]{1,16}") {
        let config = config();
        prop_assume!(name != AUTH_TOKEN_HEADER);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/analyze")
            .header(name.as_str(), config.token().expose())
            .body(())
            .unwrap();

        let outcome = validate(&request, loopback(), &config);

        prop_assert_eq!(outcome.rejection(), Some(Rejection::Unauthorized));
    }

    #[test]
    fn test_declared_length_over_limit_is_rejected_and_logged(declared in (LIMIT + 1)..u64::MAX) {
        let (logs, _guard) = LogCapture::install();
        let config = config();
        let request = request(&config)
            .header(header::CONTENT_LENGTH, declared)
            .body(())
            .unwrap();

        let outcome = validate(&request, loopback(), &config);

        prop_assert_eq!(
            outcome.rejection(),
            Some(Rejection::PayloadTooLarge { declared, limit: LIMIT })
        );
        let contents = logs.contents();
        let declared_field = format!("declared={declared}");
        let limit_field = format!("limit={LIMIT}");
        prop_assert!(contents.contains(&declared_field), "{}", contents);
        prop_assert!(contents.contains(&limit_field), "{}", contents);
    }

    #[test]
    fn test_declared_length_within_limit_is_accepted(declared in 0..=LIMIT, cancel in any::<bool>()) {
        let config = config();
        let path = if cancel { "/cancel" } else { "/analyze" };
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(AUTH_TOKEN_HEADER, config.token().expose())
            .header(header::CONTENT_LENGTH, declared)
            .body(())
            .unwrap();

        let outcome = validate(&request, loopback(), &config);

        prop_assert!(outcome.is_accepted());
        let expected = if cancel { RequestType::Cancel } else { RequestType::Analyze };
        prop_assert_eq!(outcome.request_type(), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_engine_is_never_reached_from_remote_peers(ip in non_loopback_ip()) {
        let engine = StaticEngine::new();
        let limits = ServerLimits::default();
        let provider = Arc::new(CredentialProvider::new(limits.clone()).unwrap());
        let dispatcher = Arc::new(AnalysisDispatcher::new(Arc::new(engine.clone()), &limits));
        let handler = RequestHandler::new(Arc::clone(&provider), dispatcher);

        let request = request(&provider.current())
            .body(Full::new(Bytes::from_static(fixtures::ANALYZE_BODY.as_bytes())))
            .unwrap();
        let response = tokio_test::block_on(handler.handle(request, Some(SocketAddr::new(ip, 443))));

        prop_assert_eq!(response.status(), StatusCode::FORBIDDEN);
        prop_assert_eq!(engine.calls(), 0);
    }
}
