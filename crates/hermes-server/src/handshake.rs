//! Launch configuration handed to the client out of band.
//!
//! After every successful start the host passes the active port and token,
//! plus the analyzer property keys it expects, to the process that will call
//! the server. The payload is re-issued whenever startup rotated credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credentials::ServerConfiguration;

/// Port, token and analyzer property keys for the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SidecarHandshake {
    /// Loopback port the server listens on.
    pub port: u16,
    /// Value for the `X-Auth-Token` header.
    pub token: String,
    /// Analyzer property keys the client should forward.
    #[serde(default)]
    pub analyzer_property_keys: Vec<String>,
}

impl SidecarHandshake {
    /// Builds the handshake for a configuration.
    pub fn new(config: &ServerConfiguration, analyzer_property_keys: &[String]) -> Self {
        Self {
            port: config.port(),
            token: config.token().expose().to_string(),
            analyzer_property_keys: analyzer_property_keys.to_vec(),
        }
    }

    /// Listener prefix the client should call.
    pub fn prefix(&self) -> String {
        crate::listener::prefix_for(self.port)
    }

    /// Serializes the handshake to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Debug for SidecarHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SidecarHandshake")
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("analyzer_property_keys", &self.analyzer_property_keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialProvider, ServerLimits};

    #[test]
    fn test_handshake_from_configuration() {
        let config = CredentialProvider::new(ServerLimits::default())
            .unwrap()
            .current();
        let keys = vec!["sonar.cs.analyzer.projectOutPaths".to_string()];
        let handshake = SidecarHandshake::new(&config, &keys);

        assert_eq!(handshake.port, config.port());
        assert_eq!(handshake.token, config.token().expose());
        assert_eq!(handshake.prefix(), config.prefix());

        let json: serde_json::Value = serde_json::from_str(&handshake.to_json().unwrap()).unwrap();
        assert_eq!(json["Port"], config.port());
        assert_eq!(json["Token"], config.token().expose());
        assert_eq!(json["AnalyzerPropertyKeys"][0], "sonar.cs.analyzer.projectOutPaths");
    }

    #[test]
    fn test_debug_redacts_token() {
        let handshake = SidecarHandshake {
            port: 50000,
            token: "c2VjcmV0".to_string(),
            analyzer_property_keys: Vec::new(),
        };
        let rendered = format!("{handshake:?}");
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("50000"));
    }
}
