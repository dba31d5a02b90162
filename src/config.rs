//! Bridge configuration
//!
//! The native call surface never reports how much it wrote into a string
//! output, so every output region is allocated at a fixed ceiling. The
//! ceilings are protocol limits: output that does not fit is an error.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Landmark JSON output region
pub const DEFAULT_LANDMARK_CEILING: usize = 1_000_000;

/// Encoded PNG output region
pub const DEFAULT_IMAGE_CEILING: usize = 10_000_000;

/// Image key output region
pub const DEFAULT_KEY_CEILING: usize = 16;

/// Output ceilings used by the dispatcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Bytes reserved for `detect_landmarks` output
    pub landmark_ceiling: usize,
    /// Bytes reserved for `create_tiled_print` output
    pub image_ceiling: usize,
    /// Bytes reserved for the key written by `set_image`, terminator included
    pub key_ceiling: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            landmark_ceiling: DEFAULT_LANDMARK_CEILING,
            image_ceiling: DEFAULT_IMAGE_CEILING,
            key_ceiling: DEFAULT_KEY_CEILING,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(text: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            serde_json::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.landmark_ceiling == 0 || self.image_ceiling == 0 {
            return Err(BridgeError::Config(
                "output ceilings must be non-zero".to_string(),
            ));
        }
        // One byte of key plus the terminator
        if self.key_ceiling < 2 {
            return Err(BridgeError::Config(format!(
                "keyCeiling must be at least 2, got {}",
                self.key_ceiling
            )));
        }
        Ok(())
    }
}
