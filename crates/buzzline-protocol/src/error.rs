//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes and the Rust types disagree.
//! Game-rule failures (room full, not the host, ...) live in the room
//! crate and travel to clients as [`ServerMessage`](crate::ServerMessage)
//! values instead.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (Rust value → bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (bytes → Rust value).
    ///
    /// Typical causes are malformed JSON, an unknown `"type"` tag, or a
    /// field with the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but makes no sense at the protocol level,
    /// e.g. an empty frame.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
