//! Error types for bridge operations.

use thiserror::Error;

/// Errors that can occur while moving a command across the native boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The native allocator could not satisfy the request.
    #[error("Native allocation of {requested} bytes failed")]
    OutOfMemory { requested: usize },

    /// Input bytes do not fit the region they were written to.
    #[error("Write of {len} bytes does not fit a {capacity}-byte region")]
    SizeMismatch { capacity: usize, len: usize },

    /// Native output reached or exceeded its fixed ceiling.
    #[error("Native output of {len} bytes exceeds the {ceiling}-byte ceiling")]
    BufferOverflow { ceiling: usize, len: usize },

    /// Native output is not valid UTF-8.
    #[error("Native output is not valid UTF-8: {0}")]
    DecodeError(String),

    /// Native output is not a complete, well-formed JSON document.
    #[error("Malformed native response: {0}")]
    MalformedResponse(String),

    /// Image operation attempted before the configure handshake succeeded.
    #[error("Native module is not configured")]
    NotConfigured,

    /// The configure handshake was already attempted in this session.
    #[error("Native module configuration was already attempted")]
    AlreadyConfigured,

    /// The native call reported failure through its status or length.
    #[error("Native operation '{operation}' failed: {detail}")]
    NativeOperationFailed {
        operation: &'static str,
        detail: String,
    },

    /// A string bound for the native side contains a NUL byte.
    #[error("String contains an interior NUL byte")]
    InteriorNul,

    /// A region handle was used after it was released.
    #[error("Region {0} was already released")]
    ReleasedRegion(u32),

    /// A structured value could not be serialized.
    #[error("Encoding error: {0}")]
    EncodeError(String),

    /// Invalid bridge or bundle configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to load the native library or a bundled asset.
    #[error("Failed to load '{path}': {reason}")]
    Load { path: String, reason: String },
}

impl BridgeError {
    /// Create a native operation failure.
    pub fn native_failed(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::NativeOperationFailed {
            operation,
            detail: detail.into(),
        }
    }

    /// Create a load error.
    pub fn load(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable tag carried in the `kind` field of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "OutOfMemory",
            Self::SizeMismatch { .. } => "SizeMismatch",
            Self::BufferOverflow { .. } => "BufferOverflow",
            Self::DecodeError(_) => "DecodeError",
            Self::MalformedResponse(_) => "MalformedResponse",
            Self::NotConfigured => "NotConfigured",
            Self::AlreadyConfigured => "AlreadyConfigured",
            Self::NativeOperationFailed { .. } => "NativeOperationFailed",
            Self::InteriorNul => "InteriorNul",
            Self::ReleasedRegion(_) => "ReleasedRegion",
            Self::EncodeError(_) => "EncodeError",
            Self::Config(_) => "Config",
            Self::Load { .. } => "Load",
        }
    }

    /// Whether the error was raised before any native call was attempted.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured | Self::AlreadyConfigured | Self::InteriorNul | Self::EncodeError(_)
        )
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
