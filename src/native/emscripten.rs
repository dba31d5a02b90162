//! Native module compiled with Emscripten
//!
//! The module object produced by the Emscripten glue exposes its exports as
//! `_name` functions and its linear memory as `HEAPU8`. `HEAPU8` is replaced
//! whenever the memory grows, so it is looked up again on every access.

use js_sys::{Function, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};

use crate::console_error;
use crate::error::{BridgeError, BridgeResult};
use crate::memory::{NativeHeap, Ptr};
use crate::native::NativeModule;

/// Emscripten `Module` object with its exports resolved
pub struct EmscriptenModule {
    module: JsValue,
    malloc: Function,
    free: Function,
    configure: Function,
    set_image: Function,
    detect_landmarks: Function,
    create_tiled_print: Function,
}

fn export(module: &JsValue, name: &str) -> BridgeResult<Function> {
    Reflect::get(module, &JsValue::from_str(name))
        .ok()
        .and_then(|f| f.dyn_into::<Function>().ok())
        .ok_or_else(|| BridgeError::load("Module", format!("export '{}' is not a function", name)))
}

fn ptr_arg(ptr: Ptr) -> JsValue {
    JsValue::from_f64(ptr as f64)
}

impl EmscriptenModule {
    /// Resolve the exports of an initialized Emscripten module.
    pub fn from_js(module: JsValue) -> BridgeResult<Self> {
        Ok(EmscriptenModule {
            malloc: export(&module, "_malloc")?,
            free: export(&module, "_free")?,
            configure: export(&module, "_configure")?,
            set_image: export(&module, "_set_image")?,
            detect_landmarks: export(&module, "_detect_landmarks")?,
            create_tiled_print: export(&module, "_create_tiled_print")?,
            module,
        })
    }

    fn heap_u8(&self) -> Option<Uint8Array> {
        Reflect::get(&self.module, &JsValue::from_str("HEAPU8"))
            .ok()
            .and_then(|heap| heap.dyn_into::<Uint8Array>().ok())
    }

    /// Call an export. A thrown exception (an aborted native call) is `None`.
    fn call(&self, name: &str, f: &Function, args: &[JsValue]) -> Option<JsValue> {
        let result = match args {
            [a] => f.call1(&JsValue::NULL, a),
            [a, b] => f.call2(&JsValue::NULL, a, b),
            [a, b, c] => f.call3(&JsValue::NULL, a, b, c),
            _ => f.call0(&JsValue::NULL),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                console_error!("native {} threw: {:?}", name, e);
                None
            }
        }
    }

    fn call_status(&self, name: &str, f: &Function, args: &[JsValue]) -> bool {
        match self.call(name, f, args) {
            // void exports return undefined
            Some(value) if value.is_undefined() => true,
            Some(value) => value.as_bool().unwrap_or_else(|| value.as_f64().map_or(false, |n| n != 0.0)),
            None => false,
        }
    }

    fn call_length(&self, name: &str, f: &Function, args: &[JsValue]) -> usize {
        match self.call(name, f, args).and_then(|value| value.as_f64()) {
            Some(n) if n > 0.0 => n as usize,
            _ => 0,
        }
    }
}

impl NativeHeap for EmscriptenModule {
    fn malloc(&mut self, size: usize) -> Option<Ptr> {
        match self.call_length("_malloc", &self.malloc, &[JsValue::from_f64(size as f64)]) {
            0 => None,
            ptr => Some(ptr),
        }
    }

    fn free(&mut self, ptr: Ptr) {
        self.call("_free", &self.free, &[ptr_arg(ptr)]);
    }

    fn write(&mut self, ptr: Ptr, data: &[u8]) {
        match self.heap_u8() {
            Some(heap) => heap
                .subarray(ptr as u32, (ptr + data.len()) as u32)
                .copy_from(data),
            None => console_error!("HEAPU8 unavailable, dropped {}-byte write", data.len()),
        }
    }

    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        match self.heap_u8() {
            Some(heap) => heap.subarray(ptr as u32, (ptr + len) as u32).to_vec(),
            None => {
                console_error!("HEAPU8 unavailable, {}-byte read returns zeros", len);
                vec![0u8; len]
            }
        }
    }
}

impl NativeModule for EmscriptenModule {
    fn configure(&mut self, config: Ptr) -> bool {
        self.call_status("_configure", &self.configure, &[ptr_arg(config)])
    }

    fn set_image(&mut self, image: Ptr, len: usize, out_key: Ptr) -> bool {
        let args = [ptr_arg(image), JsValue::from_f64(len as f64), ptr_arg(out_key)];
        self.call_status("_set_image", &self.set_image, &args)
    }

    fn detect_landmarks(&mut self, key: Ptr, out_landmarks: Ptr) -> bool {
        let args = [ptr_arg(key), ptr_arg(out_landmarks)];
        self.call_status("_detect_landmarks", &self.detect_landmarks, &args)
    }

    fn create_tiled_print(&mut self, key: Ptr, request: Ptr, out_image: Ptr) -> usize {
        let args = [ptr_arg(key), ptr_arg(request), ptr_arg(out_image)];
        self.call_length("_create_tiled_print", &self.create_tiled_print, &args)
    }
}
