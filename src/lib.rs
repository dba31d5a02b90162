//! Passport-photo native bridge
//!
//! Moves commands from the UI into a non-reentrant image-processing module that
//! is reachable only through flat pointers into its own address space. The
//! bridge encodes requests into native buffers, owns the lifetime of every
//! buffer it allocates there, and runs commands strictly one at a time.

use wasm_bindgen::prelude::*;

pub mod arena;
pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod model;
pub mod native;
pub mod protocol;

#[cfg(target_arch = "wasm32")]
mod worker;

pub use arena::{Arena, Region};
pub use bootstrap::{ConfigBundle, Readiness};
pub use config::BridgeConfig;
pub use dispatcher::{DispatchState, Dispatcher};
pub use error::{BridgeError, BridgeResult};
pub use memory::{LinearHeap, NativeHeap, Ptr};
pub use model::{
    CanvasSpec, ImageKey, LandmarkPair, PixelBuffer, Point, PrintStandard, TiledPrintRequest, Unit,
};
pub use native::NativeModule;
pub use protocol::{CommandKind, Request, Response};

#[cfg(target_arch = "wasm32")]
pub use worker::PhotoBridge;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Log to browser console
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);

    #[wasm_bindgen(js_namespace = console)]
    fn error(s: &str);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn log(s: &str) {
    println!("LOG: {}", s);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn error(s: &str) {
    eprintln!("ERROR: {}", s);
}

/// Helper macro for console logging
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_error {
    ($($t:tt)*) => ($crate::error(&format!($($t)*)))
}
