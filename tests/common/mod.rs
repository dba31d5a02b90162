#![allow(dead_code)]

use std::collections::HashMap;

use ppp_bridge::{
    BridgeConfig, ConfigBundle, Dispatcher, LinearHeap, NativeHeap, NativeModule, Ptr, Request,
    Response, TiledPrintRequest,
};
use serde_json::json;

/// What `detect_landmarks` does for a given image
#[derive(Clone, Debug)]
pub enum Detection {
    /// Writes both points
    Found { crown: (f64, f64), chin: (f64, f64) },
    /// Writes `{"errorMsg": ...}` and reports failure
    NoFace(String),
    /// Reports failure and writes nothing
    Silent,
    /// Writes `len` bytes of JSON-looking text, truncated to the region like snprintf
    Oversized(usize),
    /// Writes valid landmark JSON space-padded to fill the region, with no terminator
    Unterminated,
}

/// In-process stand-in for the image-processing module.
///
/// Runs over a [`LinearHeap`] and records every native call it receives.
pub struct ScriptedModule {
    pub heap: LinearHeap,
    pub calls: Vec<&'static str>,
    pub accept_config: bool,
    pub config: Option<serde_json::Value>,
    pub images: HashMap<String, Vec<u8>>,
    pub detection: HashMap<String, Detection>,
    pub print_requests: Vec<TiledPrintRequest>,
    /// Length `create_tiled_print` reports; `None` writes a real payload
    pub print_length: Option<usize>,
    /// Key written by `set_image` instead of the generated one
    pub forced_key: Option<Vec<u8>>,
    next_image: u32,
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-print";

impl ScriptedModule {
    pub fn new(heap_size: usize) -> Self {
        ScriptedModule {
            heap: LinearHeap::new(heap_size),
            calls: Vec::new(),
            accept_config: true,
            config: None,
            images: HashMap::new(),
            detection: HashMap::new(),
            print_requests: Vec::new(),
            print_length: None,
            forced_key: None,
            next_image: 0,
        }
    }

    fn write_c_str(&mut self, ptr: Ptr, text: &str) {
        let size = self.heap.block_size(ptr).unwrap_or(0);
        let mut bytes = text.as_bytes().to_vec();
        // snprintf-style: truncate to the region and always terminate
        bytes.truncate(size.saturating_sub(1));
        bytes.push(0);
        self.heap.write(ptr, &bytes);
    }
}

impl NativeHeap for ScriptedModule {
    fn malloc(&mut self, size: usize) -> Option<Ptr> {
        self.heap.malloc(size)
    }

    fn free(&mut self, ptr: Ptr) {
        self.heap.free(ptr)
    }

    fn write(&mut self, ptr: Ptr, data: &[u8]) {
        self.heap.write(ptr, data)
    }

    fn read(&self, ptr: Ptr, len: usize) -> Vec<u8> {
        self.heap.read(ptr, len)
    }
}

impl NativeModule for ScriptedModule {
    fn configure(&mut self, config: Ptr) -> bool {
        self.calls.push("configure");
        self.config = self
            .heap
            .read_c_str(config)
            .and_then(|text| serde_json::from_str(&text).ok());
        self.accept_config
    }

    fn set_image(&mut self, image: Ptr, len: usize, out_key: Ptr) -> bool {
        self.calls.push("set_image");
        if len == 0 {
            return false;
        }
        let bytes = self.heap.read(image, len);

        if let Some(key) = self.forced_key.clone() {
            self.heap.write(out_key, &key);
            return true;
        }

        let key = format!("img{}", self.next_image);
        self.next_image += 1;
        self.images.insert(key.clone(), bytes);
        self.write_c_str(out_key, &key);
        true
    }

    fn detect_landmarks(&mut self, key: Ptr, out: Ptr) -> bool {
        self.calls.push("detect_landmarks");
        let key = self.heap.read_c_str(key).unwrap_or_default();
        if !self.images.contains_key(&key) {
            self.write_c_str(out, r#"{"errorMsg":"unknown image key"}"#);
            return false;
        }

        let detection = self.detection.get(&key).cloned().unwrap_or(Detection::Found {
            crown: (120.0, 40.0),
            chin: (120.0, 300.0),
        });
        match detection {
            Detection::Found { crown, chin } => {
                let text = json!({
                    "crownPoint": {"x": crown.0, "y": crown.1},
                    "chinPoint": {"x": chin.0, "y": chin.1}
                })
                .to_string();
                self.write_c_str(out, &text);
                true
            }
            Detection::NoFace(msg) => {
                self.write_c_str(out, &json!({ "errorMsg": msg }).to_string());
                false
            }
            Detection::Silent => false,
            Detection::Oversized(len) => {
                let mut text = String::from(r#"{"crownPoint":{"x":1,"y":2},"padding":""#);
                text.push_str(&"x".repeat(len));
                text.push_str(r#"","chinPoint":{"x":1,"y":9}}"#);
                self.write_c_str(out, &text);
                true
            }
            Detection::Unterminated => {
                let size = self.heap.block_size(out).unwrap_or(0);
                let mut text = r#"{"crownPoint":{"x":1,"y":2},"chinPoint":{"x":1,"y":9}}"#
                    .as_bytes()
                    .to_vec();
                text.resize(size, b' ');
                self.heap.write(out, &text);
                true
            }
        }
    }

    fn create_tiled_print(&mut self, key: Ptr, request: Ptr, out: Ptr) -> usize {
        self.calls.push("create_tiled_print");
        let key = self.heap.read_c_str(key).unwrap_or_default();
        let request: Option<TiledPrintRequest> = self
            .heap
            .read_c_str(request)
            .and_then(|text| serde_json::from_str(&text).ok());

        let Some(request) = request else {
            return 0;
        };
        if request.img_key().as_str() != key || !self.images.contains_key(&key) {
            return 0;
        }
        self.print_requests.push(request);

        match self.print_length {
            Some(len) => len,
            None => {
                self.heap.write(out, PNG);
                PNG.len()
            }
        }
    }
}

pub fn small_config() -> BridgeConfig {
    BridgeConfig {
        landmark_ceiling: 4096,
        image_ceiling: 64 * 1024,
        key_ceiling: 16,
    }
}

pub fn dispatcher() -> Dispatcher<ScriptedModule> {
    Dispatcher::new(ScriptedModule::new(1 << 20), small_config()).unwrap()
}

pub fn bundle() -> ConfigBundle {
    ConfigBundle::from_value(json!({
        "eyesDetector": {"useHaarCascade": false},
        "shapePredictor": {"file": "sp_model.dat", "data": "AAEC"}
    }))
    .unwrap()
}

pub fn configured() -> Dispatcher<ScriptedModule> {
    let mut d = dispatcher();
    d.dispatch(Request::Configure { config: bundle() });
    let responses = d.take_responses();
    assert!(matches!(responses[..], [Response::RuntimeInitialized { .. }]));
    d
}

/// Dispatch one request and return its only response.
pub fn one(d: &mut Dispatcher<ScriptedModule>, request: Request) -> Response {
    d.dispatch(request);
    let mut responses = d.take_responses();
    assert_eq!(responses.len(), 1, "expected exactly one response: {:?}", responses);
    responses.remove(0)
}

pub fn error_kind(response: &Response) -> &str {
    match response {
        Response::Error { kind, .. } => kind.as_str(),
        other => panic!("expected an error response, got {:?}", other),
    }
}

/// Every allocation made so far has been freed exactly once.
pub fn assert_heap_balanced(d: &Dispatcher<ScriptedModule>) {
    let stats = d.module().heap.stats();
    assert_eq!(stats.allocations, stats.frees, "leaked native blocks: {:?}", stats);
    assert_eq!(stats.invalid_frees, 0, "double or invalid free: {:?}", stats);
    assert_eq!(d.module().heap.live_blocks(), 0);
}
