//! Frame encoding and decoding for the WebSocket transport.
//!
//! Frames are single JSON text messages. Decoding enforces a size ceiling
//! before touching the parser so oversized payloads are rejected cheaply.

use crate::event::ServerFrame;
use crate::intent::ClientFrame;
use thiserror::Error;

/// Hard ceiling on an inbound frame. Anything larger is rejected unparsed.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds limit of {MAX_FRAME_BYTES}")]
    TooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode a raw text frame into a [`ClientFrame`].
pub fn decode_client_frame(raw: &str) -> Result<ClientFrame, FrameError> {
    if raw.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(raw.len()));
    }
    Ok(serde_json::from_str(raw)?)
}

/// Encode a [`ServerFrame`] for the wire.
///
/// Serialization of these types cannot fail (no non-string map keys, no
/// non-finite floats), so the fallback is never expected to be taken.
pub fn encode_server_frame(frame: &ServerFrame) -> String {
    serde_json::to_string(frame).unwrap_or_else(|_| {
        r#"{"event":"ack","data":{"ok":false,"code":"internal"}}"#.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AckBody, ServerEvent};
    use crate::intent::ClientIntent;

    #[test]
    fn rejects_oversized_frames_before_parsing() {
        let raw = format!(
            r#"{{"event":"typingStart","data":{{"to":"{}"}}}}"#,
            "x".repeat(MAX_FRAME_BYTES)
        );
        assert!(matches!(
            decode_client_frame(&raw),
            Err(FrameError::TooLarge(_))
        ));
    }

    #[test]
    fn rejects_unknown_event_names() {
        let err = decode_client_frame(r#"{"event":"dropTables","data":{}}"#).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn decodes_and_encodes() {
        let frame = decode_client_frame(r#"{"event":"typingStart","data":{"to":"b@x"}}"#).unwrap();
        assert_eq!(
            frame.intent,
            ClientIntent::TypingStart { to: "b@x".into() }
        );

        let out = encode_server_frame(&ServerFrame {
            seq: Some(1),
            event: ServerEvent::Ack(AckBody {
                ok: false,
                code: Some("not_found".into()),
                message: Some("no such message".into()),
                data: None,
            }),
        });
        assert!(out.contains(r#""code":"not_found""#));
    }
}
