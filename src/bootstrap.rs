//! Configuration handshake
//!
//! The native module must receive its configuration before it accepts any
//! image. The configuration is one JSON document in which every referenced
//! asset (classifier cascades, the shape predictor model) is embedded as
//! Base64 under a `data` member, next to the `file` member naming it.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::arena::Arena;
use crate::codec;
use crate::console_log;
use crate::error::{BridgeError, BridgeResult};
use crate::native::NativeModule;

/// Session readiness, decided once by the configure handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Configure has not run yet
    Pending,
    /// Configure succeeded; image operations are accepted
    Ready,
    /// Configure failed; the session stays unusable
    Failed,
}

/// Merged configuration with its binary assets embedded
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigBundle(Value);

impl ConfigBundle {
    /// Wrap a parsed configuration. The root must be an object.
    pub fn from_value(value: Value) -> BridgeResult<Self> {
        if !value.is_object() {
            return Err(BridgeError::Config(
                "configuration root must be a JSON object".to_string(),
            ));
        }
        Ok(ConfigBundle(value))
    }

    pub fn from_json(text: &str) -> BridgeResult<Self> {
        let value = serde_json::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Deep-merge `overlay` into the bundle.
    ///
    /// Objects merge key by key; any other value replaces what was there.
    pub fn merge(mut self, overlay: Value) -> Self {
        merge_value(&mut self.0, overlay);
        self
    }

    /// Embed every `{"file": ...}` node that has no `data` yet.
    ///
    /// `resolve` maps the file name to its raw bytes. Names ending in `.zst`
    /// or `.gz` are decompressed before encoding.
    pub fn embed_files<F>(mut self, mut resolve: F) -> BridgeResult<Self>
    where
        F: FnMut(&str) -> BridgeResult<Vec<u8>>,
    {
        expand_node(&mut self.0, &mut resolve)?;
        Ok(self)
    }

    /// [`embed_files`](Self::embed_files) resolving names against `share_dir`.
    pub fn embed_from_dir(self, share_dir: &Path) -> BridgeResult<Self> {
        self.embed_files(|name| {
            let path: PathBuf = share_dir.join(name);
            std::fs::read(&path).map_err(|e| BridgeError::load(path.display().to_string(), e))
        })
    }

    /// NUL-terminated JSON text for the native `configure` call
    pub fn into_payload(self) -> BridgeResult<Vec<u8>> {
        codec::encode_json(&self.0)
    }
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn needs_data(node: &Map<String, Value>) -> Option<String> {
    let file = node.get("file")?.as_str()?;
    match node.get("data") {
        Some(Value::String(data)) if !data.is_empty() => None,
        _ => Some(file.to_string()),
    }
}

fn expand_node<F>(node: &mut Value, resolve: &mut F) -> BridgeResult<()>
where
    F: FnMut(&str) -> BridgeResult<Vec<u8>>,
{
    let Value::Object(map) = node else {
        return Ok(());
    };

    if let Some(file) = needs_data(map) {
        let raw = resolve(&file)?;
        let bytes = decompress_asset(&file, raw)?;
        console_log!("bootstrap: embedded {} ({} bytes)", file, bytes.len());
        map.insert("data".to_string(), Value::String(BASE64.encode(bytes)));
        return Ok(());
    }

    for child in map.values_mut() {
        expand_node(child, resolve)?;
    }
    Ok(())
}

/// Decompress an asset according to its file extension.
pub fn decompress_asset(name: &str, raw: Vec<u8>) -> BridgeResult<Vec<u8>> {
    if name.ends_with(".zst") {
        return zstd::stream::decode_all(&raw[..])
            .map_err(|e| BridgeError::load(name, format!("zstd decompression error: {}", e)));
    }
    if name.ends_with(".gz") {
        use std::io::Read;

        let mut decoder = flate2::read::GzDecoder::new(&raw[..]);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| BridgeError::load(name, format!("gzip decompression error: {}", e)))?;
        return Ok(out);
    }
    Ok(raw)
}

/// Run the configure handshake.
///
/// The bundle is consumed; its encoded payload lives in native memory only for
/// the duration of the call.
pub fn run<M: NativeModule>(module: &mut M, bundle: ConfigBundle) -> BridgeResult<()> {
    let payload = bundle.into_payload()?;
    let mut arena = Arena::new(module);

    let config = arena.allocate_with(&payload)?;
    let ok = arena.native().configure(config.ptr());
    arena.release(config);

    if !ok {
        return Err(BridgeError::native_failed(
            "configure",
            "module rejected the configuration",
        ));
    }
    console_log!("bootstrap: configured with {} byte payload", payload.len());
    Ok(())
}
