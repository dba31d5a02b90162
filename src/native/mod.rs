//! Native module call surface
//!
//! The image-processing module exposes four calls over its own address space.
//! All pointers are addresses in that space, all strings are NUL-terminated
//! UTF-8, and every output region is allocated by the caller.
//!
//! The module is not reentrant. Implementations are driven from one
//! [`Dispatcher`](crate::dispatcher::Dispatcher) at a time and are never shared.

use crate::memory::{NativeHeap, Ptr};

#[cfg(target_arch = "wasm32")]
pub mod emscripten;

#[cfg(not(target_arch = "wasm32"))]
pub mod library;

/// The four native operations
pub trait NativeModule: NativeHeap {
    /// Hand the module its configuration bundle (JSON text).
    fn configure(&mut self, config: Ptr) -> bool;

    /// Decode `len` bytes of encoded image at `image` and register it.
    ///
    /// On success the image key is written to `out_key` as a C string.
    fn set_image(&mut self, image: Ptr, len: usize, out_key: Ptr) -> bool;

    /// Detect crown and chin of the image named by the C string at `key`.
    ///
    /// Landmark JSON is written to `out_landmarks`, also on failure when the
    /// module can describe the error.
    fn detect_landmarks(&mut self, key: Ptr, out_landmarks: Ptr) -> bool;

    /// Render a tiled print sheet as PNG into `out_image`.
    ///
    /// Returns the number of bytes written; `0` means failure.
    fn create_tiled_print(&mut self, key: Ptr, request: Ptr, out_image: Ptr) -> usize;
}
