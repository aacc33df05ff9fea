// One-time acquisition of both capabilities at startup.
//
// Failures are logged and recorded as `Unavailable`; they never abort startup
// and a failure in one capability does not affect the other.

use super::{CapabilityRegistry, FaceRestoration, SuperResolution};
use crate::error::LoadError;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Produces a ready-to-use super-resolution instance.
pub trait SuperResolutionSource: Send + Sync {
    fn acquire(
        &self,
    ) -> impl Future<Output = Result<Arc<dyn SuperResolution>, LoadError>> + Send;
}

/// Produces a ready-to-use face restoration instance.
pub trait FaceRestorationSource: Send + Sync {
    /// `background` is the loaded super-resolution instance, when there is
    /// one, for upsampling the background during paste-back.
    fn acquire(
        &self,
        background: Option<Arc<dyn SuperResolution>>,
    ) -> impl Future<Output = Result<Arc<dyn FaceRestoration>, LoadError>> + Send;
}

/// Loads both capabilities and returns the populated registry.
///
/// Must run once, before the server starts accepting requests.
pub async fn load_all<S, F>(super_resolution: &S, face_restoration: &F) -> CapabilityRegistry
where
    S: SuperResolutionSource,
    F: FaceRestorationSource,
{
    let mut registry = CapabilityRegistry::new();

    info!("Loading SuperResolution model...");
    let outcome = super_resolution.acquire().await;
    match &outcome {
        Ok(_) => info!("SuperResolution loaded successfully"),
        Err(e) => error!("Failed to load SuperResolution: {}", e),
    }
    registry.register_super_resolution(outcome);

    info!("Loading FaceRestoration model...");
    let background = registry.super_resolution();
    if background.is_none() {
        info!("FaceRestoration will upsample backgrounds without SuperResolution");
    }
    let outcome = face_restoration.acquire(background).await;
    match &outcome {
        Ok(_) => info!("FaceRestoration loaded successfully"),
        Err(e) => error!("Failed to load FaceRestoration: {}", e),
    }
    registry.register_face_restoration(outcome);

    registry
}
