//! Values exchanged with the native module
//!
//! Field names follow the JSON the native side parses (`imgKey`, `crownPoint`,
//! `chinPoint`, `errorMsg`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Opaque identifier of an image held by the native module.
///
/// The native module owns the image for the rest of the session; there is no
/// release call for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn new(key: impl Into<String>) -> Self {
        ImageKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image-space point in pixels
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Crown and chin landmarks, or the reason detection failed
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crown_point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chin_point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl LandmarkPair {
    pub fn detected(crown_point: Point, chin_point: Point) -> Self {
        LandmarkPair {
            crown_point: Some(crown_point),
            chin_point: Some(chin_point),
            error_msg: None,
        }
    }

    pub fn failed(error_msg: impl Into<String>) -> Self {
        LandmarkPair {
            crown_point: None,
            chin_point: None,
            error_msg: Some(error_msg.into()),
        }
    }

    /// Both points present and no error
    pub fn is_detected(&self) -> bool {
        self.crown_point.is_some() && self.chin_point.is_some() && self.error_msg.is_none()
    }

    /// Accept exactly two shapes: both points, or a non-empty error message.
    ///
    /// An empty `errorMsg` is treated as absent.
    pub fn validate(mut self) -> BridgeResult<Self> {
        if self.error_msg.as_deref().map_or(false, str::is_empty) {
            self.error_msg = None;
        }

        match (&self.crown_point, &self.chin_point, &self.error_msg) {
            (Some(_), Some(_), None) => Ok(self),
            (None, None, Some(_)) => Ok(self),
            (_, _, Some(msg)) => Err(BridgeError::MalformedResponse(format!(
                "landmarks carry both points and an error: {}",
                msg
            ))),
            _ => Err(BridgeError::MalformedResponse(
                "landmarks carry neither both points nor an error message".to_string(),
            )),
        }
    }
}

/// Physical unit of a print or canvas dimension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Mm,
    Inch,
    Pixel,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Mm => "mm",
            Unit::Inch => "inch",
            Unit::Pixel => "pixel",
        }
    }

    pub fn parse(s: &str) -> Option<Unit> {
        match s {
            "mm" => Some(Unit::Mm),
            "inch" | "in" => Some(Unit::Inch),
            "pixel" | "px" => Some(Unit::Pixel),
            _ => None,
        }
    }
}

/// Target photo dimensions of a passport standard
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrintStandard {
    pub height: f64,
    pub width: f64,
    pub resolution: f64,
    pub units: Unit,
}

/// Physical sheet the photos are tiled onto
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub height: f64,
    pub width: f64,
    pub resolution: f64,
    pub units: Unit,
}

impl Default for PrintStandard {
    fn default() -> Self {
        PrintStandard {
            height: 45.0,
            width: 35.0,
            resolution: 300.0,
            units: Unit::Mm,
        }
    }
}

impl Default for CanvasSpec {
    fn default() -> Self {
        CanvasSpec {
            height: 4.0,
            width: 6.0,
            resolution: 300.0,
            units: Unit::Inch,
        }
    }
}

/// Everything the native module needs to lay out one print sheet
///
/// Built once per print request and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiledPrintRequest {
    img_key: ImageKey,
    standard: PrintStandard,
    canvas: CanvasSpec,
    #[serde(flatten)]
    landmarks: LandmarkPair,
}

impl TiledPrintRequest {
    pub fn new(
        img_key: ImageKey,
        standard: PrintStandard,
        canvas: CanvasSpec,
        landmarks: LandmarkPair,
    ) -> Self {
        TiledPrintRequest {
            img_key,
            standard,
            canvas,
            landmarks,
        }
    }

    pub fn img_key(&self) -> &ImageKey {
        &self.img_key
    }

    pub fn standard(&self) -> &PrintStandard {
        &self.standard
    }

    pub fn canvas(&self) -> &CanvasSpec {
        &self.canvas
    }

    pub fn landmarks(&self) -> &LandmarkPair {
        &self.landmarks
    }
}

/// Encoded image bytes passing through the bridge for a single call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelBuffer(Vec<u8>);

impl PixelBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for PixelBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        PixelBuffer(bytes)
    }
}
