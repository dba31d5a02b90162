//! Boundary encodings
//!
//! The native side takes NUL-terminated UTF-8 strings and JSON text, and hands
//! back JSON text or raw encoded bytes in caller-allocated regions.

use std::ffi::CString;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::arena::{Arena, Region};
use crate::error::{BridgeError, BridgeResult};
use crate::memory::NativeHeap;
use crate::model::PixelBuffer;

/// UTF-8 bytes of `s` followed by a NUL terminator.
pub fn encode_utf8_cstring(s: &str) -> BridgeResult<Vec<u8>> {
    CString::new(s)
        .map(CString::into_bytes_with_nul)
        .map_err(|_| BridgeError::InteriorNul)
}

/// Serialize `value` to JSON, as a NUL-terminated string.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> BridgeResult<Vec<u8>> {
    let text = serde_json::to_string(value).map_err(|e| BridgeError::EncodeError(e.to_string()))?;
    encode_utf8_cstring(&text)
}

/// Parse a complete JSON document.
///
/// A document cut short by a full output region fails here rather than being
/// accepted as a partial result.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> BridgeResult<T> {
    serde_json::from_slice(bytes).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
}

/// Owned copy of the first `length` bytes of `region`.
///
/// Nothing in the result refers to the native heap, so the region can be
/// released as soon as this returns.
pub fn raw_bytes_to_transferable<H: NativeHeap + ?Sized>(
    arena: &Arena<'_, H>,
    region: Region,
    length: usize,
) -> BridgeResult<PixelBuffer> {
    arena.read_bytes(region, length).map(PixelBuffer::from)
}
