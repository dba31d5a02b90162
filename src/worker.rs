//! Web worker surface
//!
//! The worker script owns one [`PhotoBridge`]. It calls `configure` once the
//! Emscripten runtime is initialized, then forwards every UI message to
//! `post_message`. Responses are posted back to the UI thread and also
//! returned to the caller.

use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{DedicatedWorkerGlobalScope, MessageEvent};

use crate::bootstrap::ConfigBundle;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::native::emscripten::EmscriptenModule;
use crate::protocol::{Request, Response};
use crate::{console_error, console_log};

fn to_js(err: BridgeError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Bridge between the UI thread and the Emscripten image-processing module
#[wasm_bindgen]
pub struct PhotoBridge {
    dispatcher: Dispatcher<EmscriptenModule>,
}

#[wasm_bindgen]
impl PhotoBridge {
    /// Wrap an initialized Emscripten `Module`.
    ///
    /// `config` is an optional `{ landmarkCeiling, imageCeiling, keyCeiling }` object.
    #[wasm_bindgen(constructor)]
    pub fn new(module: JsValue, config: JsValue) -> Result<PhotoBridge, JsValue> {
        let config = if config.is_undefined() || config.is_null() {
            BridgeConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let module = EmscriptenModule::from_js(module).map_err(to_js)?;
        let dispatcher = Dispatcher::new(module, config).map_err(to_js)?;
        console_log!(
            "PhotoBridge ready for configure (landmarks {} B, image {} B)",
            dispatcher.config().landmark_ceiling,
            dispatcher.config().image_ceiling
        );

        Ok(PhotoBridge { dispatcher })
    }

    /// Run the configure handshake with the bundled configuration JSON.
    pub fn configure(&mut self, bundle_json: &str) -> Result<Array, JsValue> {
        let config = ConfigBundle::from_json(bundle_json).map_err(to_js)?;
        self.dispatcher.submit(Request::Configure { config });
        Ok(self.flush())
    }

    /// Accept one `{ cmd, ... }` message from the UI.
    pub fn post_message(&mut self, message: JsValue) -> Result<Array, JsValue> {
        let request = request_from_js(&message)?;
        self.dispatcher.submit(request);
        Ok(self.flush())
    }

    /// `onmessage` handler
    pub fn handle_event(&mut self, event: MessageEvent) -> Result<Array, JsValue> {
        self.post_message(event.data())
    }

    pub fn is_ready(&self) -> bool {
        self.dispatcher.is_ready()
    }
}

impl PhotoBridge {
    fn flush(&mut self) -> Array {
        self.dispatcher.pump();

        let scope = js_sys::global().dyn_into::<DedicatedWorkerGlobalScope>().ok();
        let out = Array::new();
        for response in self.dispatcher.take_responses() {
            let value = response_to_js(&response).unwrap_or_else(|e| {
                console_error!("could not convert {} response: {:?}", response.cmd(), e);
                fallback_error(&response)
            });
            if let Some(scope) = &scope {
                if let Err(e) = scope.post_message(&value) {
                    console_error!("postMessage failed: {:?}", e);
                }
            }
            out.push(&value);
        }
        out
    }
}

fn request_from_js(message: &JsValue) -> Result<Request, JsValue> {
    let cmd = Reflect::get(message, &JsValue::from_str("cmd"))?
        .as_string()
        .ok_or_else(|| JsValue::from_str("message has no 'cmd'"))?;

    // ArrayBuffer or typed array; copied out of JS before dispatch
    if cmd == "setImage" {
        let data = Reflect::get(message, &JsValue::from_str("imageData"))?;
        let bytes = Uint8Array::new(&data).to_vec();
        return Ok(Request::SetImage {
            image_data: bytes.into(),
        });
    }

    serde_wasm_bindgen::from_value(message.clone()).map_err(JsValue::from)
}

fn response_to_js(response: &Response) -> Result<JsValue, JsValue> {
    match response {
        Response::TiledPrintCreated { seq, png_data } => {
            let obj = Object::new();
            Reflect::set(&obj, &JsValue::from_str("cmd"), &JsValue::from_str(response.cmd()))?;
            Reflect::set(&obj, &JsValue::from_str("seq"), &JsValue::from_f64(*seq as f64))?;
            Reflect::set(
                &obj,
                &JsValue::from_str("pngData"),
                &Uint8Array::from(png_data.as_bytes()),
            )?;
            Ok(obj.into())
        }
        other => Ok(serde_wasm_bindgen::to_value(other)?),
    }
}

fn fallback_error(response: &Response) -> JsValue {
    let obj = Object::new();
    let _ = Reflect::set(&obj, &JsValue::from_str("cmd"), &JsValue::from_str("onError"));
    let _ = Reflect::set(&obj, &JsValue::from_str("seq"), &JsValue::from_f64(response.seq() as f64));
    let _ = Reflect::set(&obj, &JsValue::from_str("kind"), &JsValue::from_str("EncodeError"));
    obj.into()
}
