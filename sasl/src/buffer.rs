//! Length-prefixed framing of security layer records.
//!
//! Each record travels as a four byte big-endian length followed by that many bytes.

use crate::error::{BufferError, Error};

const PREFIX_SIZE: usize = 4;

/// Prefixes `data` with its length, which has to fit in 32 bits.
pub fn wrap(data: &[u8]) -> Result<Vec<u8>, Error> {
    let length = frame_length(data.len())?;
    let mut framed = Vec::with_capacity(PREFIX_SIZE + data.len());
    framed.extend_from_slice(&length.to_be_bytes());
    framed.extend_from_slice(data);
    Ok(framed)
}

fn frame_length(length: usize) -> Result<u32, BufferError> {
    u32::try_from(length).map_err(|_| BufferError::TooLarge(length))
}

/// Returns the first complete record of `data`.
///
/// Bytes past the declared length are left for the caller. A `BufferIncomplete` error means
/// more data has to arrive before the same call can succeed.
pub fn unwrap(data: &[u8]) -> Result<&[u8], Error> {
    let prefix = data
        .get(..PREFIX_SIZE)
        .and_then(|prefix| <[u8; PREFIX_SIZE]>::try_from(prefix).ok())
        .ok_or(BufferError::NotEnoughData)?;
    let declared = u32::from_be_bytes(prefix) as usize;
    let available = data.len() - PREFIX_SIZE;
    if available < declared {
        return Err(BufferError::Incomplete {
            declared,
            available,
        }
        .into());
    }
    Ok(&data[PREFIX_SIZE..PREFIX_SIZE + declared])
}
