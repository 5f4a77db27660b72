//! Protocol error types.

use thiserror::Error;

/// Errors produced while encoding, decoding, or dispatching messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// A value could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A frame body was malformed.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// The frame carried a message tag this build does not know.
    #[error("unknown message tag: {0}")]
    UnknownTag(String),

    /// The frame exceeds [`MAX_FRAME_LEN`](crate::codec::MAX_FRAME_LEN).
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Length announced by the frame.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// The buffer ends before the frame does.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    IncompleteFrame {
        /// Bytes required to finish the frame.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// Pixel storage does not match the rectangle's geometry.
    #[error("pixel storage holds {actual} bytes, geometry requires {expected}")]
    PixelStorage {
        /// `height * row_bytes`.
        expected: usize,
        /// Length of the supplied storage.
        actual: usize,
    },

    /// A handler received a message kind it does not accept.
    #[error("unhandled message: {kind}")]
    Unhandled {
        /// Wire tag of the rejected message.
        kind: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_unknown_tag_display() {
        let err = ProtoError::UnknownTag("msg.bogus".into());
        assert_eq!(err.to_string(), "unknown message tag: msg.bogus");
    }

    #[test]
    fn error_frame_too_large_display() {
        let err = ProtoError::FrameTooLarge { len: 10, max: 4 };
        assert_eq!(err.to_string(), "frame of 10 bytes exceeds the 4 byte limit");
    }

    #[test]
    fn error_incomplete_frame_display() {
        let err = ProtoError::IncompleteFrame {
            needed: 12,
            available: 3,
        };
        assert_eq!(err.to_string(), "incomplete frame: need 12 bytes, have 3");
    }

    #[test]
    fn error_unhandled_display() {
        let err = ProtoError::Unhandled { kind: "msg.term" };
        assert_eq!(err.to_string(), "unhandled message: msg.term");
    }

    #[test]
    fn error_pixel_storage_display() {
        let err = ProtoError::PixelStorage {
            expected: 16,
            actual: 15,
        };
        assert!(err.to_string().contains("requires 16"));
    }
}
