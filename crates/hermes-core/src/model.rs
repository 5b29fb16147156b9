//! Wire model for the analysis protocol.
//!
//! Request payloads are closed schemas: unknown members are refused rather
//! than ignored, so a payload can never select which type gets materialized.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Caller-supplied correlation id for one analysis job.
///
/// The host picks the id when it submits a job and later uses the same id to
/// cancel it.
///
/// # Example
///
/// ```
/// use hermes_core::AnalysisId;
///
/// let id = AnalysisId::new();
/// assert_eq!(id, AnalysisId::from_uuid(*id.as_uuid()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(Uuid);

impl AnalysisId {
    /// Creates a new random analysis id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AnalysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AnalysisId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A rule the engine should evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ActiveRule {
    /// Rule identifier, e.g. `S1481`.
    pub rule_id: String,
}

impl ActiveRule {
    /// Creates an active rule.
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
        }
    }
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct AnalysisRequest {
    /// Files to analyze. Never empty once decoded.
    #[serde(default)]
    pub file_uris: Vec<Url>,
    /// Rules to evaluate.
    #[serde(default)]
    pub active_rules: Vec<ActiveRule>,
    /// Correlation id used for cancellation.
    pub analysis_id: AnalysisId,
}

impl AnalysisRequest {
    /// Creates a request for the given files and rules.
    pub fn new(
        file_uris: impl IntoIterator<Item = Url>,
        active_rules: impl IntoIterator<Item = ActiveRule>,
        analysis_id: AnalysisId,
    ) -> Self {
        Self {
            file_uris: file_uris.into_iter().collect(),
            active_rules: active_rules.into_iter().collect(),
            analysis_id,
        }
    }
}

/// Body of `POST /cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CancellationRequest {
    /// Id of the job to cancel.
    pub analysis_id: AnalysisId,
}

/// Zero-based line/offset range inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextRange {
    /// First line of the range.
    pub start_line: u32,
    /// Offset within the first line.
    pub start_line_offset: u32,
    /// Last line of the range.
    pub end_line: u32,
    /// Offset within the last line.
    pub end_line_offset: u32,
}

/// A single issue reported by the analysis engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diagnostic {
    /// Id of the rule that raised the issue.
    pub id: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// File the issue belongs to.
    pub file_uri: Url,
    /// Location of the issue, when the engine reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_range: Option<TextRange>,
}

impl Diagnostic {
    /// Creates a diagnostic without a location.
    pub fn new(id: impl Into<String>, message: impl Into<String>, file_uri: Url) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            file_uri,
            text_range: None,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_text_range(mut self, range: TextRange) -> Self {
        self.text_range = Some(range);
        self
    }
}

/// Success body of `POST /analyze`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnalysisResponse {
    /// Issues found across all analyzed files.
    pub diagnostics: Vec<Diagnostic>,
}

/// Success body of `POST /cancel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancellationResponse {
    /// Whether a running job was signalled.
    pub cancelled: bool,
}

/// The kind of request, derived from the path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// `POST /analyze`
    Analyze,
    /// `POST /cancel`
    Cancel,
    /// Any other path.
    Unknown,
}

impl RequestType {
    /// Path of the analyze route.
    pub const ANALYZE_PATH: &'static str = "/analyze";

    /// Path of the cancel route.
    pub const CANCEL_PATH: &'static str = "/cancel";

    /// Maps a request path to its type. Only exact matches are recognized.
    ///
    /// ```
    /// use hermes_core::RequestType;
    ///
    /// assert_eq!(RequestType::from_path("/analyze"), RequestType::Analyze);
    /// assert_eq!(RequestType::from_path("/analyze/extra"), RequestType::Unknown);
    /// ```
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path {
            Self::ANALYZE_PATH => Self::Analyze,
            Self::CANCEL_PATH => Self::Cancel,
            _ => Self::Unknown,
        }
    }

    /// Returns a short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Cancel => "cancel",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_from_path() {
        assert_eq!(RequestType::from_path("/analyze"), RequestType::Analyze);
        assert_eq!(RequestType::from_path("/cancel"), RequestType::Cancel);
        assert_eq!(RequestType::from_path("/"), RequestType::Unknown);
        assert_eq!(RequestType::from_path(""), RequestType::Unknown);
        assert_eq!(RequestType::from_path("/analyze/"), RequestType::Unknown);
        assert_eq!(RequestType::from_path("/cancel/123"), RequestType::Unknown);
        assert_eq!(RequestType::from_path("/ANALYZE"), RequestType::Unknown);
    }

    #[test]
    fn test_analysis_id_parse_and_display() {
        let id: AnalysisId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        assert_eq!(id.to_string(), "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert!("not-a-guid".parse::<AnalysisId>().is_err());
    }

    #[test]
    fn test_diagnostic_serializes_pascal_case() {
        let diagnostic = Diagnostic::new("S101", "Rename this class", "file:///a.cs".parse().unwrap())
            .with_text_range(TextRange {
                start_line: 1,
                start_line_offset: 2,
                end_line: 1,
                end_line_offset: 8,
            });
        let json = serde_json::to_value(AnalysisResponse {
            diagnostics: vec![diagnostic],
        })
        .unwrap();

        assert_eq!(json["Diagnostics"][0]["Id"], "S101");
        assert_eq!(json["Diagnostics"][0]["FileUri"], "file:///a.cs");
        assert_eq!(json["Diagnostics"][0]["TextRange"]["EndLineOffset"], 8);
    }

    #[test]
    fn test_diagnostic_without_range_omits_member() {
        let diagnostic = Diagnostic::new("S101", "msg", "file:///a.cs".parse().unwrap());
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert!(json.get("TextRange").is_none());
    }
}
