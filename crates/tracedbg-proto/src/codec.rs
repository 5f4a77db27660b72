//! Frame codec: `[u32 little-endian body length][bincode body]`.

use crate::error::ProtoError;
use crate::message::Message;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest body accepted in either direction (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode a message into a complete frame.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtoError> {
    let body = bincode::serialize(msg).map_err(|e| ProtoError::Encode(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    tracing::trace!(tag = msg.tag(), len = body.len(), "encoded frame");
    Ok(frame)
}

/// Read the body length out of a header.
pub fn decode_header(header: [u8; HEADER_LEN]) -> Result<usize, ProtoError> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len)
}

/// Decode one frame body.
///
/// The leading tag is checked first so an unknown message kind is reported
/// as [`ProtoError::UnknownTag`] rather than a generic decode failure.
pub fn decode_body(body: &[u8]) -> Result<Message, ProtoError> {
    let tag: String = bincode::deserialize(body).map_err(|e| ProtoError::Decode(e.to_string()))?;
    if !Message::TAGS.contains(&tag.as_str()) {
        return Err(ProtoError::UnknownTag(tag));
    }
    bincode::deserialize(body).map_err(|e| ProtoError::Decode(format!("{tag}: {e}")))
}

/// Decode the first complete frame in `buf`.
///
/// Returns the message and the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(Message, usize), ProtoError> {
    let header: [u8; HEADER_LEN] = buf
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtoError::IncompleteFrame {
            needed: HEADER_LEN,
            available: buf.len(),
        })?;
    let len = decode_header(header)?;
    let total = HEADER_LEN + len;
    if buf.len() < total {
        return Err(ProtoError::IncompleteFrame {
            needed: total,
            available: buf.len(),
        });
    }
    let msg = decode_body(&buf[HEADER_LEN..total])?;
    Ok((msg, total))
}
