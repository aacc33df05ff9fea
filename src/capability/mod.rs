// Enhancement capabilities: the interfaces the pipeline talks to, the
// registry that tracks their availability, and the startup loader.

mod loader;
mod registry;
mod weights;

pub use loader::{FaceRestorationSource, SuperResolutionSource, load_all};
pub use registry::{CapabilityRegistry, CapabilityStatus};
pub use weights::{WeightCache, WeightFile};

use crate::error::InferenceError;
use crate::models::PixelBuffer;
use serde::Serialize;
use std::fmt;

/// The two independently loadable enhancement capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SuperResolution,
    FaceRestoration,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SuperResolution => f.write_str("SuperResolution"),
            Capability::FaceRestoration => f.write_str("FaceRestoration"),
        }
    }
}

/// Increases resolution while adding plausible detail.
pub trait SuperResolution: Send + Sync {
    /// Returns a buffer roughly `scale` times larger in each dimension.
    fn upscale(&self, image: &PixelBuffer, scale: u32) -> Result<PixelBuffer, InferenceError>;
}

/// Options for a face restoration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRestoreParams {
    /// Composite restored faces back onto the (upsampled) background.
    pub paste_back: bool,
    /// Restore only the face closest to the image centre.
    pub only_center_face: bool,
    /// The input already is a single aligned face crop.
    pub already_aligned: bool,
}

impl Default for FaceRestoreParams {
    fn default() -> Self {
        FaceRestoreParams {
            paste_back: true,
            only_center_face: false,
            already_aligned: false,
        }
    }
}

/// Detects faces and replaces them with a higher fidelity reconstruction.
pub trait FaceRestoration: Send + Sync {
    /// Output canvas is the same size as the input or larger.
    fn restore(
        &self,
        image: &PixelBuffer,
        params: &FaceRestoreParams,
    ) -> Result<PixelBuffer, InferenceError>;
}
