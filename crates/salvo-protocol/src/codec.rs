//! Codec trait and the JSON implementation.
//!
//! The store keeps records as opaque bytes and the server writes frames
//! as text; both go through a [`Codec`] rather than calling `serde_json`
//! directly, so the encoding is chosen in one place.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust values to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use salvo_protocol::{Codec, JsonCodec, Response, Status};
///
/// let codec = JsonCodec;
/// let resp = Response::error("shoot", "Not your turn");
///
/// let bytes = codec.encode(&resp).unwrap();
/// let back: Response = codec.decode(&bytes).unwrap();
/// assert_eq!(back.status, Status::Error);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Board, GameId, GameSession, PlayerId};

    #[test]
    fn test_json_codec_decode_garbage_fails() {
        let result: Result<GameSession, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_session_roundtrip() {
        let session = GameSession::new(
            GameId::new_random(),
            [PlayerId::new_random(), PlayerId::new_random()],
            42,
        );
        let bytes = JsonCodec.encode(&session).unwrap();
        let back: GameSession = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_json_codec_board_is_plain_map() {
        let board: Board =
            JsonCodec.decode(br#"{"Destroyer":["A1","A2"]}"#).unwrap();
        let bytes = JsonCodec.encode(&board).unwrap();
        assert_eq!(bytes, br#"{"Destroyer":["A1","A2"]}"#);
    }
}
