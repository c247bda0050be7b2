//! Frame and message encoding without any I/O.
//!
//! A frame is a big-endian `u16` length followed by that many payload bytes.
//! The payload is one JSON encoded [`Message`].

use super::types::ParseResult;
use crate::error::*;
use crate::message::Message;

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 2;

/// Decode a length prefix and check it against `max_frame_size`.
pub fn frame_length(header: [u8; HEADER_SIZE], max_frame_size: usize) -> Result<usize> {
    let len = u16::from_be_bytes(header) as usize;
    if len > max_frame_size {
        return Err(ErrorKind::Protocol(format!(
            "frame length {} exceeds maximum of {}",
            len, max_frame_size
        ))
        .into());
    }
    Ok(len)
}

/// Parse one frame from the start of `buf`.
///
/// # Example
///
/// ```
/// use dsvdc::sansio::protocol::parse_frame;
/// use dsvdc::sansio::types::ParseResult;
///
/// let buf = [0u8, 2, b'{', b'}', 0, 9];
/// match parse_frame(&buf, 16384) {
///     ParseResult::Complete { payload, consumed } => {
///         assert_eq!(payload, b"{}");
///         assert_eq!(consumed, 4);
///     }
///     _ => panic!("Expected complete frame"),
/// }
/// ```
pub fn parse_frame(buf: &[u8], max_frame_size: usize) -> ParseResult {
    if buf.len() < HEADER_SIZE {
        return ParseResult::Incomplete {
            needed: HEADER_SIZE - buf.len(),
        };
    }

    let len = match frame_length([buf[0], buf[1]], max_frame_size) {
        Ok(len) => len,
        Err(e) => {
            return ParseResult::Invalid {
                error: e.to_string(),
            }
        }
    };

    let end = HEADER_SIZE + len;
    if buf.len() < end {
        return ParseResult::Incomplete {
            needed: end - buf.len(),
        };
    }

    ParseResult::Complete {
        payload: buf[HEADER_SIZE..end].to_vec(),
        consumed: end,
    }
}

/// Prefix `payload` with its length.
pub fn serialize_frame(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>> {
    if payload.len() > max_frame_size || payload.len() > u16::MAX as usize {
        return Err(ErrorKind::Protocol(format!(
            "payload of {} bytes exceeds maximum of {}",
            payload.len(),
            max_frame_size
        ))
        .into());
    }
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Fails with [`ErrorKind::Param`] if the message holds a value JSON cannot
/// represent, such as a NaN double.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(message)
        .map_err(|e| Error::with_source(ErrorKind::Param(e.to_string()), e))
}

pub fn decode_message(payload: &[u8]) -> Result<Message> {
    Ok(serde_json::from_slice(payload)?)
}

/// Best effort look at the request id of a payload that failed to decode.
pub fn peek_message_id(payload: &[u8]) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let id = value.get("message_id")?.as_u64()?;
    u32::try_from(id).ok()
}
