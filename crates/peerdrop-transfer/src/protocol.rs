/// Packed chunk frame format.
///
/// ```text
/// [0..2]      Header length L (u16 BE)
/// [2..2+L]    UTF-8 JSON header, e.g. {"type":"chunk","fileId":"...","chunkIndex":4}
/// [2+L..]     Raw chunk payload (may be empty)
/// ```
///
/// One frame per message, no separators. The header is decodable without
/// knowing the payload length: the payload is whatever follows it.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Length prefix size in bytes.
pub const LEN_PREFIX: usize = 2;

/// Largest header the prefix can describe.
pub const MAX_HEADER_LEN: usize = u16::MAX as usize;

/// Default chunk size: 16 KiB, safe for every data-channel implementation.
pub const DEFAULT_CHUNK_SIZE: u32 = 16 * 1024;

/// Default number of unacknowledged chunks in flight per transfer.
pub const DEFAULT_WINDOW_SIZE: u32 = 4;

/// Default per-chunk retransmit timeout in milliseconds.
pub const DEFAULT_RETRANSMIT_MS: u64 = 5000;

/// Total size of a frame with the given header and payload lengths.
pub fn frame_len(header_len: usize, payload_len: usize) -> usize {
    LEN_PREFIX + header_len + payload_len
}

/// Pack `header` and `payload` into one contiguous frame.
pub fn encode_frame<H: Serialize>(header: &H, payload: &[u8]) -> Result<Bytes, CodecError> {
    let header_bytes = serde_json::to_vec(header).map_err(CodecError::Encode)?;
    if header_bytes.len() > MAX_HEADER_LEN {
        return Err(CodecError::HeaderTooLarge(header_bytes.len()));
    }

    let mut buf = BytesMut::with_capacity(frame_len(header_bytes.len(), payload.len()));
    buf.put_u16(header_bytes.len() as u16);
    buf.put_slice(&header_bytes);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Split a frame into its decoded header and payload.
/// The payload is a zero-copy slice of `frame`.
pub fn decode_frame<H: DeserializeOwned>(frame: Bytes) -> Result<(H, Bytes), CodecError> {
    if frame.len() < LEN_PREFIX {
        return Err(CodecError::Truncated {
            needed: LEN_PREFIX,
            actual: frame.len(),
        });
    }
    let header_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let payload_start = LEN_PREFIX + header_len;
    if frame.len() < payload_start {
        return Err(CodecError::Truncated {
            needed: payload_start,
            actual: frame.len(),
        });
    }

    // serde_json rejects invalid UTF-8 itself.
    let header = serde_json::from_slice(&frame[LEN_PREFIX..payload_start])
        .map_err(CodecError::Decode)?;
    Ok((header, frame.slice(payload_start..)))
}
