// Holds the loaded capability instances and their availability.
//
// The loader is the only writer; once startup finishes the registry is moved
// into an `Arc` and only read by request handlers, so no locking is needed.

use super::{Capability, FaceRestoration, FaceRestoreParams, SuperResolution};
use crate::error::{EnhanceError, LoadError};
use crate::models::PixelBuffer;
use std::sync::Arc;

/// Lifecycle of one capability.
pub enum CapabilityState<T: ?Sized> {
    /// Load has not been attempted.
    Unloaded,
    Available(Arc<T>),
    /// Load was attempted and failed; the reason is kept for diagnostics.
    Unavailable(String),
}

// Manual impl: `#[derive(Default)]` would require `T: Default`.
impl<T: ?Sized> Default for CapabilityState<T> {
    fn default() -> Self {
        CapabilityState::Unloaded
    }
}

impl<T: ?Sized> CapabilityState<T> {
    fn status(&self) -> CapabilityStatus {
        match self {
            CapabilityState::Unloaded => CapabilityStatus::Unloaded,
            CapabilityState::Available(_) => CapabilityStatus::Available,
            CapabilityState::Unavailable(reason) => CapabilityStatus::Unavailable(reason.clone()),
        }
    }

    fn from_outcome(outcome: Result<Arc<T>, LoadError>) -> Self {
        match outcome {
            Ok(instance) => CapabilityState::Available(instance),
            Err(err) => CapabilityState::Unavailable(err.to_string()),
        }
    }
}

/// Instance-free view of a capability state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    Unloaded,
    Available,
    Unavailable(String),
}

#[derive(Default)]
pub struct CapabilityRegistry {
    super_resolution: CapabilityState<dyn SuperResolution>,
    face_restoration: CapabilityState<dyn FaceRestoration>,
}

impl CapabilityRegistry {
    /// Registry with both capabilities `Unloaded`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_super_resolution(
        &mut self,
        outcome: Result<Arc<dyn SuperResolution>, LoadError>,
    ) {
        self.super_resolution = CapabilityState::from_outcome(outcome);
    }

    pub fn register_face_restoration(
        &mut self,
        outcome: Result<Arc<dyn FaceRestoration>, LoadError>,
    ) {
        self.face_restoration = CapabilityState::from_outcome(outcome);
    }

    pub fn status(&self, capability: Capability) -> CapabilityStatus {
        match capability {
            Capability::SuperResolution => self.super_resolution.status(),
            Capability::FaceRestoration => self.face_restoration.status(),
        }
    }

    pub fn is_available(&self, capability: Capability) -> bool {
        self.status(capability) == CapabilityStatus::Available
    }

    /// The loaded super-resolution instance, if any. Used to hand the
    /// background upsampler to face restoration at load time.
    pub fn super_resolution(&self) -> Option<Arc<dyn SuperResolution>> {
        match &self.super_resolution {
            CapabilityState::Available(instance) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Runs super-resolution on `image`.
    pub fn super_resolve(
        &self,
        image: &PixelBuffer,
        scale: u32,
    ) -> Result<PixelBuffer, EnhanceError> {
        let CapabilityState::Available(model) = &self.super_resolution else {
            return Err(EnhanceError::CapabilityUnavailable(
                Capability::SuperResolution,
            ));
        };

        model
            .upscale(image, scale)
            .map_err(|e| EnhanceError::Inference {
                capability: Capability::SuperResolution,
                message: e.to_string(),
            })
    }

    /// Runs face restoration on `image`.
    pub fn restore_faces(
        &self,
        image: &PixelBuffer,
        params: &FaceRestoreParams,
    ) -> Result<PixelBuffer, EnhanceError> {
        let CapabilityState::Available(model) = &self.face_restoration else {
            return Err(EnhanceError::CapabilityUnavailable(
                Capability::FaceRestoration,
            ));
        };

        model
            .restore(image, params)
            .map_err(|e| EnhanceError::Inference {
                capability: Capability::FaceRestoration,
                message: e.to_string(),
            })
    }
}
