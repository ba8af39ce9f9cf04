//! WebSocket Message Types
//!
//! Subscribers are receive-only: the server sends reading messages and the
//! client answers nothing but control frames.

use serde::Serialize;

use crate::reading::Reading;

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// A reading was ingested
    Reading(&'a Reading),
}

impl ServerMessage<'_> {
    /// Encode as the text payload of a single WebSocket frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
