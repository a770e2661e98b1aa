//! Record framing.
//!
//! ```text
//! [4 bytes: length of everything after this field (big-endian u32)]
//! [1 byte:  form tag]
//! [4 bytes: CRC32 of payload (big-endian u32)]
//! [N bytes: bincode payload]
//! ```

use tracing::warn;

use crate::error::{CodecError, CodecResult};

/// Maximum payload size accepted by the codecs (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Bytes preceding the payload.
pub const HEADER_SIZE: usize = 4 + 1 + 4;

/// Which record type and encoding a frame carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FormTag {
    PersistedKey = 0x01,
    NetworkKey = 0x02,
    PersistedBucket = 0x11,
    NetworkBucket = 0x12,
}

impl FormTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(FormTag::PersistedKey),
            0x02 => Some(FormTag::NetworkKey),
            0x11 => Some(FormTag::PersistedBucket),
            0x12 => Some(FormTag::NetworkBucket),
            _ => None,
        }
    }
}

/// Wrap `payload` in a frame.
pub fn frame(tag: FormTag, payload: &[u8]) -> CodecResult<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let len = (1 + 4 + payload.len()) as u32;
    let crc = crc32fast::hash(payload);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.push(tag.as_u8());
    buf.extend_from_slice(&crc.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Validate a frame of form `expected` at the start of `data`.
///
/// Returns the payload and the total number of bytes the frame occupies.
pub fn unframe(data: &[u8], expected: FormTag) -> CodecResult<(&[u8], usize)> {
    if data.len() < HEADER_SIZE {
        return Err(CodecError::FramingError(format!(
            "too short: {} bytes, header needs {HEADER_SIZE}",
            data.len()
        )));
    }
    let len = read_u32(&data[0..4]) as usize;
    if len < 5 {
        return Err(CodecError::FramingError(format!("frame length {len} below header")));
    }
    if len - 5 > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge {
            size: len - 5,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let total = 4 + len;
    if data.len() < total {
        return Err(CodecError::FramingError(format!(
            "incomplete: have {}, need {}",
            data.len(),
            total
        )));
    }

    let tag = data[4];
    if tag != expected.as_u8() {
        return Err(CodecError::WrongForm {
            expected,
            actual: tag,
        });
    }

    let expected_crc = read_u32(&data[5..9]);
    let payload = &data[HEADER_SIZE..total];
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        warn!(
            form = ?expected,
            expected = expected_crc,
            actual = actual_crc,
            "CRC mismatch; rejecting record"
        );
        return Err(CodecError::ChecksumMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }
    Ok((payload, total))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}
