//! Codec trait and the JSON implementation.
//!
//! The gateway never calls `serde_json` directly. It holds something that
//! implements [`Codec`], so a compact binary format can replace JSON later
//! without touching the handler or the room engine.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Turns protocol values into frames and frames back into values.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] for an empty frame and
    /// [`ProtocolError::Decode`] when the bytes don't match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// JSON keeps frames readable in browser DevTools, which matters more for
/// a party game than the few bytes a binary format would save.
///
/// ```rust
/// use buzzline_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = br#"{"type":"buzz"}"#;
/// let msg: ClientMessage = codec.decode(bytes).unwrap();
/// assert_eq!(msg, ClientMessage::Buzz);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(ProtocolError::InvalidMessage("empty frame".into()));
        }
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
