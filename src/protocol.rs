//! Request and response messages
//!
//! Every message is one self-contained object with a `cmd` discriminator.
//! Responses carry the sequence number the dispatcher assigned to the request
//! they answer.

use serde::{Deserialize, Serialize};

use crate::bootstrap::ConfigBundle;
use crate::error::BridgeError;
use crate::model::{ImageKey, LandmarkPair, PixelBuffer, TiledPrintRequest};

/// Kind of a dispatched command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    Configure,
    SetImage,
    DetectLandmarks,
    CreateTiledPrint,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Configure => "configure",
            CommandKind::SetImage => "setImage",
            CommandKind::DetectLandmarks => "detectLandmarks",
            CommandKind::CreateTiledPrint => "createTiledPrint",
        }
    }

    /// Whether the command needs a configured module
    pub fn requires_configuration(&self) -> bool {
        !matches!(self, CommandKind::Configure)
    }
}

/// Incoming command
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Request {
    /// Startup handshake; normally issued once by the host, not the UI
    Configure { config: ConfigBundle },

    SetImage {
        #[serde(rename = "imageData")]
        image_data: PixelBuffer,
    },

    DetectLandmarks {
        #[serde(rename = "imgKey")]
        img_key: ImageKey,
    },

    CreateTiledPrint { request: TiledPrintRequest },
}

impl Request {
    pub fn kind(&self) -> CommandKind {
        match self {
            Request::Configure { .. } => CommandKind::Configure,
            Request::SetImage { .. } => CommandKind::SetImage,
            Request::DetectLandmarks { .. } => CommandKind::DetectLandmarks,
            Request::CreateTiledPrint { .. } => CommandKind::CreateTiledPrint,
        }
    }
}

/// Outgoing event, exactly one per accepted request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Response {
    #[serde(rename = "onRuntimeInitialized")]
    RuntimeInitialized { seq: u32 },

    #[serde(rename = "onRuntimeFailed")]
    RuntimeFailed { seq: u32, message: String },

    #[serde(rename = "onImageSet")]
    ImageSet {
        seq: u32,
        #[serde(rename = "imgKey")]
        img_key: ImageKey,
    },

    #[serde(rename = "onLandmarksDetected")]
    LandmarksDetected { seq: u32, landmarks: LandmarkPair },

    #[serde(rename = "onCreateTilePrint")]
    TiledPrintCreated {
        seq: u32,
        #[serde(rename = "pngData")]
        png_data: PixelBuffer,
    },

    #[serde(rename = "onError")]
    Error {
        seq: u32,
        request: CommandKind,
        kind: String,
        message: String,
    },
}

impl Response {
    /// Typed error response for a failed request
    pub fn error(seq: u32, request: CommandKind, err: &BridgeError) -> Self {
        Response::Error {
            seq,
            request,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn seq(&self) -> u32 {
        match self {
            Response::RuntimeInitialized { seq }
            | Response::RuntimeFailed { seq, .. }
            | Response::ImageSet { seq, .. }
            | Response::LandmarksDetected { seq, .. }
            | Response::TiledPrintCreated { seq, .. }
            | Response::Error { seq, .. } => *seq,
        }
    }

    /// Value of the `cmd` field
    pub fn cmd(&self) -> &'static str {
        match self {
            Response::RuntimeInitialized { .. } => "onRuntimeInitialized",
            Response::RuntimeFailed { .. } => "onRuntimeFailed",
            Response::ImageSet { .. } => "onImageSet",
            Response::LandmarksDetected { .. } => "onLandmarksDetected",
            Response::TiledPrintCreated { .. } => "onCreateTilePrint",
            Response::Error { .. } => "onError",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. } | Response::RuntimeFailed { .. })
    }
}
