//! Strict JSON codec for the analysis protocol.
//!
//! Decoding binds directly to the concrete payload types in this crate. There
//! is no "resolve type by name" mode: the payload types refuse unknown
//! members, so a body carrying a type hint such as
//! `"$type": "System.Windows.Data.ObjectDataProvider, PresentationFramework"`
//! fails exactly like malformed JSON does.
//!
//! # Example
//!
//! ```
//! use hermes_core::codec;
//!
//! let body = br#"{"FileUris":["file:///c:/src/a.cs"],"ActiveRules":[{"RuleId":"S101"}],"AnalysisId":"0f8fad5b-d9cb-469f-a165-70867728950e"}"#;
//! let request = codec::decode_analysis_request(body).unwrap();
//! assert_eq!(request.active_rules[0].rule_id, "S101");
//!
//! let hostile = br#"{"$type":"System.Windows.Data.ObjectDataProvider, PresentationFramework","MethodName":"Start"}"#;
//! assert!(codec::decode_analysis_request(hostile).is_err());
//! ```

use bytes::Bytes;
use http::HeaderValue;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, CodecResult};
use crate::model::{AnalysisRequest, CancellationRequest};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes the body of `POST /analyze`.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed JSON, schema mismatches (including
/// unknown members and type hints), and a missing or empty `FileUris` list.
pub fn decode_analysis_request(body: &[u8]) -> CodecResult<AnalysisRequest> {
    let request: AnalysisRequest = decode_object(body)?;
    if request.file_uris.is_empty() {
        return Err(CodecError::EmptyFileUris);
    }
    Ok(request)
}

/// Decodes the body of `POST /cancel`.
///
/// # Errors
///
/// Returns [`CodecError`] for malformed JSON or schema mismatches.
pub fn decode_cancellation_request(body: &[u8]) -> CodecResult<CancellationRequest> {
    decode_object(body)
}

/// Serializes a response payload.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(CodecError::Encode)
}

/// Checks that a `Content-Type` header, if any, declares UTF-8.
///
/// A missing header or a media type without a `charset` parameter is treated
/// as UTF-8.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedCharset`] for any other charset.
pub fn check_charset(content_type: Option<&HeaderValue>) -> CodecResult<()> {
    let Some(value) = content_type else {
        return Ok(());
    };
    let Ok(value) = value.to_str() else {
        return Err(CodecError::UnsupportedCharset {
            charset: "<non-ascii>".to_string(),
        });
    };

    let charset = value.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });

    match charset {
        None => Ok(()),
        Some(charset)
            if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") =>
        {
            Ok(())
        }
        Some(charset) => Err(CodecError::UnsupportedCharset { charset }),
    }
}

/// Decodes a top-level JSON object into `T`.
///
/// serde would also accept a JSON array for a struct (positional form); the
/// wire format only allows objects.
fn decode_object<T: DeserializeOwned>(body: &[u8]) -> CodecResult<T> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);

    match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => {}
        Some(_) => {
            return Err(CodecError::Schema {
                message: "expected a JSON object".to_string(),
            })
        }
        None => {
            return Err(CodecError::Malformed {
                message: "empty body".to_string(),
            })
        }
    }

    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActiveRule, AnalysisId, AnalysisResponse, Diagnostic};

    const GUID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    fn analyze_body(file_uris: &str) -> String {
        format!(
            r#"{{"FileUris":{file_uris},"ActiveRules":[{{"RuleId":"S101"}}],"AnalysisId":"{GUID}"}}"#
        )
    }

    #[test]
    fn test_decode_analysis_request_exact_values() {
        let body = analyze_body(r#"["file:///c:/src/Program.cs"]"#);
        let request = decode_analysis_request(body.as_bytes()).unwrap();

        assert_eq!(request.file_uris.len(), 1);
        assert_eq!(request.file_uris[0].as_str(), "file:///c:/src/Program.cs");
        assert_eq!(request.active_rules, vec![ActiveRule::new("S101")]);
        assert_eq!(request.analysis_id, GUID.parse::<AnalysisId>().unwrap());
    }

    #[test]
    fn test_decode_rejects_empty_file_uris() {
        let body = analyze_body("[]");
        assert!(matches!(
            decode_analysis_request(body.as_bytes()),
            Err(CodecError::EmptyFileUris)
        ));
    }

    #[test]
    fn test_decode_rejects_missing_file_uris() {
        let body = format!(r#"{{"ActiveRules":[],"AnalysisId":"{GUID}"}}"#);
        assert!(matches!(
            decode_analysis_request(body.as_bytes()),
            Err(CodecError::EmptyFileUris)
        ));
    }

    #[test]
    fn test_decode_rejects_missing_analysis_id() {
        let body = r#"{"FileUris":["file:///a.cs"],"ActiveRules":[]}"#;
        assert!(matches!(
            decode_analysis_request(body.as_bytes()),
            Err(CodecError::Schema { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_top_level_type_hint() {
        let body = format!(
            r#"{{"$type":"System.Windows.Data.ObjectDataProvider, PresentationFramework","FileUris":["file:///a.cs"],"AnalysisId":"{GUID}"}}"#
        );
        assert!(matches!(
            decode_analysis_request(body.as_bytes()),
            Err(CodecError::Schema { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_nested_gadget_payload() {
        let body = format!(
            r#"{{"FileUris":["file:///a.cs"],"ActiveRules":[{{"$type":"System.Windows.Data.ObjectDataProvider, PresentationFramework","MethodName":"Start","MethodParameters":{{"$type":"System.Collections.ArrayList, mscorlib","$values":["cmd","/c calc"]}},"ObjectInstance":{{"$type":"System.Diagnostics.Process, System"}}}}],"AnalysisId":"{GUID}"}}"#
        );
        assert!(decode_analysis_request(body.as_bytes()).is_err());
    }

    proptest::proptest! {
        #[test]
        fn test_decode_rejects_any_unknown_member(
            name in "[$A-Za-z_][A-Za-z0-9_$]{0,16}",
            value in ".*",
        ) {
            proptest::prop_assume!(!["FileUris", "ActiveRules", "AnalysisId"].contains(&name.as_str()));
            let mut body: serde_json::Value =
                serde_json::from_str(&analyze_body(r#"["file:///a.cs"]"#)).unwrap();
            body[name.as_str()] = serde_json::Value::String(value);

            let result = decode_analysis_request(body.to_string().as_bytes());
            proptest::prop_assert!(matches!(result, Err(CodecError::Schema { .. })), "{:?}", result);
        }

        #[test]
        fn test_decode_arbitrary_bytes_never_panics(body in proptest::collection::vec(proptest::num::u8::ANY, 0..256)) {
            let _ = decode_analysis_request(&body);
            let _ = decode_cancellation_request(&body);
        }
    }

    #[test]
    fn test_decode_rejects_array_form() {
        let body = format!(r#"[["file:///a.cs"],[],"{GUID}"]"#);
        assert!(matches!(
            decode_analysis_request(body.as_bytes()),
            Err(CodecError::Schema { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(
            decode_analysis_request(b"{\"FileUris\":["),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            decode_analysis_request(b""),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            decode_cancellation_request(b"   "),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_uri() {
        let body = analyze_body(r#"["not a uri"]"#);
        assert!(decode_analysis_request(body.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_tolerates_bom() {
        let mut body = UTF8_BOM.to_vec();
        body.extend_from_slice(format!(r#"{{"AnalysisId":"{GUID}"}}"#).as_bytes());
        let request = decode_cancellation_request(&body).unwrap();
        assert_eq!(request.analysis_id.to_string(), GUID);
    }

    #[test]
    fn test_decode_cancellation_rejects_extra_members() {
        let body = format!(r#"{{"AnalysisId":"{GUID}","Force":true}}"#);
        assert!(decode_cancellation_request(body.as_bytes()).is_err());
    }

    #[test]
    fn test_encode_response() {
        let response = AnalysisResponse {
            diagnostics: vec![Diagnostic::new("S101", "m", "file:///a.cs".parse().unwrap())],
        };
        let bytes = encode(&response).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with(r#"{"Diagnostics":[{"Id":"S101""#));
    }

    #[test]
    fn test_check_charset() {
        assert!(check_charset(None).is_ok());
        assert!(check_charset(Some(&HeaderValue::from_static("application/json"))).is_ok());
        assert!(check_charset(Some(&HeaderValue::from_static(
            "application/json; charset=utf-8"
        )))
        .is_ok());
        assert!(check_charset(Some(&HeaderValue::from_static(
            "application/json; charset=\"UTF-8\""
        )))
        .is_ok());
        assert!(matches!(
            check_charset(Some(&HeaderValue::from_static(
                "application/json; charset=utf-16"
            ))),
            Err(CodecError::UnsupportedCharset { charset }) if charset == "utf-16"
        ));
    }
}
