//! Upgrade request parameters
//!
//! The client passes `token` and `nickname` in the query string of the
//! WebSocket upgrade request, e.g. `/ws?token=abc&nickname=alice`.

use serde::Deserialize;

/// Path the WebSocket endpoint is served on
pub const WS_PATH: &str = "/ws";

/// Admission parameters read from the upgrade request
///
/// Missing parameters come back as empty strings.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdmissionRequest {
    /// Opaque per-connection token; dropped once admission is done
    pub token: String,
    /// Requested display name, not yet validated
    pub nickname: String,
}

impl AdmissionRequest {
    /// Parse a form-encoded query string (without the leading `?`)
    pub fn from_query(query: Option<&str>) -> Result<Self, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str(query.unwrap_or_default())
    }
}
