//! JSON wire protocol for room synchronization.
//!
//! One JSON object per WebSocket text frame, discriminated by `type`:
//! ```text
//! client → server   code_update  { code, userId, language }
//!                   cursor_move  { cursorPosition, userId }
//! server → client   init         { code, connectionCount, language? }
//!                   code_update  { code, userId?, cursorPosition? }
//!                   user_joined  { connectionCount }
//!                   user_left    { connectionCount }
//!                   cursor_move  { cursorPosition?, userId? }
//! ```
//!
//! Unknown `type` values decode to [`ServerMessage::Unknown`] so newer
//! servers can add kinds without breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Messages sent by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Whole-buffer snapshot after a local edit
    #[serde(rename_all = "camelCase")]
    CodeUpdate {
        code: String,
        user_id: String,
        language: String,
    },
    /// Local caret moved
    #[serde(rename_all = "camelCase")]
    CursorMove {
        cursor_position: usize,
        user_id: String,
    },
}

impl ClientMessage {
    /// Create a code update message.
    pub fn code_update(
        code: impl Into<String>,
        user_id: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self::CodeUpdate {
            code: code.into(),
            user_id: user_id.into(),
            language: language.into(),
        }
    }

    /// Create a cursor move message.
    pub fn cursor_move(cursor_position: usize, user_id: impl Into<String>) -> Self {
        Self::CursorMove {
            cursor_position,
            user_id: user_id.into(),
        }
    }

    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CodeUpdate { .. } => "code_update",
            Self::CursorMove { .. } => "cursor_move",
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Messages received from the room server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authoritative snapshot sent right after the connection opens
    #[serde(rename_all = "camelCase")]
    Init {
        code: String,
        connection_count: u32,
        #[serde(default)]
        language: Option<String>,
    },
    /// Another participant replaced the buffer
    #[serde(rename_all = "camelCase")]
    CodeUpdate {
        code: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        cursor_position: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined { connection_count: u32 },
    #[serde(rename_all = "camelCase")]
    UserLeft { connection_count: u32 },
    /// Another participant's caret moved
    #[serde(rename_all = "camelCase")]
    CursorMove {
        #[serde(default)]
        cursor_position: Option<usize>,
        #[serde(default)]
        user_id: Option<String>,
    },
    /// A `type` this client does not know about.
    #[serde(skip_deserializing)]
    Unknown { kind: String },
}

const KNOWN_SERVER_KINDS: [&str; 5] = ["init", "code_update", "user_joined", "user_left", "cursor_move"];

impl ServerMessage {
    /// Deserialize a text frame.
    ///
    /// Invalid JSON, a missing `type`, or a known kind with missing or
    /// mistyped fields is a [`ProtocolError::Decode`]. An unrecognized
    /// `type` is not an error.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| ProtocolError::Decode(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Decode("missing string field `type`".to_string()))?;

        if !KNOWN_SERVER_KINDS.contains(&kind) {
            return Ok(Self::Unknown {
                kind: kind.to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Wire name of this message kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Init { .. } => "init",
            Self::CodeUpdate { .. } => "code_update",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::CursorMove { .. } => "cursor_move",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(String),
    #[error("Malformed frame: {0}")]
    Decode(String),
}
