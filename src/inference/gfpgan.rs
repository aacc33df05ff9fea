// GFPGAN face restoration over ONNX Runtime.
//
// Faces are located with the UltraFace detector, cropped with a margin,
// restored at 512x512 and blended back onto an upsampled copy of the input.
// The background is upsampled with the super-resolution capability when one
// was injected at load time, otherwise with Lanczos3.

use super::face_detect::{DETECTOR_FILENAME, FaceBox, FaceDetector, UltraFaceDetector};
use super::onnx::{Normalization, OnnxModel, image_to_tensor, tensor_to_image};
use crate::capability::{
    FaceRestoration, FaceRestorationSource, FaceRestoreParams, SuperResolution, WeightCache,
    WeightFile,
};
use crate::error::{InferenceError, LoadError};
use crate::models::PixelBuffer;
use image::{Rgb, RgbImage, imageops};
use std::sync::Arc;
use tracing::debug;

/// Well-known cache filename of the GFPGAN weights.
pub const MODEL_FILENAME: &str = "GFPGANv1.4.onnx";

/// Default URL for downloading the GFPGAN v1.4 ONNX export.
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/facefusion/facefusion-assets/releases/download/models/gfpgan_1.4.onnx";

/// Side length of the face crops the network works on.
pub const FACE_SIZE: u32 = 512;

const MIN_MODEL_SIZE_BYTES: u64 = 1_000_000;
const MIN_DETECTOR_SIZE_BYTES: u64 = 100_000;

// Detector boxes are tight; the network expects some hair and chin around the face.
const CROP_EXPANSION: f32 = 1.6;

/// Restores one `FACE_SIZE` x `FACE_SIZE` face crop.
pub trait FaceNetwork: Send + Sync {
    fn restore_face(&self, face: &RgbImage) -> Result<RgbImage, InferenceError>;
}

impl FaceNetwork for OnnxModel {
    fn restore_face(&self, face: &RgbImage) -> Result<RgbImage, InferenceError> {
        let outputs = self.run(image_to_tensor(face, Normalization::SYMMETRIC))?;
        tensor_to_image(&outputs[0], Normalization::SYMMETRIC)
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Square region around `face`, grown by `CROP_EXPANSION` and clipped to the image.
    pub fn around(face: &FaceBox, image_width: u32, image_height: u32) -> Self {
        let (cx, cy) = face.center();
        let half = face.width().max(face.height()) * CROP_EXPANSION / 2.0;

        let x0 = (cx - half).floor().max(0.0) as u32;
        let y0 = (cy - half).floor().max(0.0) as u32;
        let x1 = ((cx + half).ceil() as u32).min(image_width);
        let y1 = ((cy + half).ceil() as u32).min(image_height);

        let x = x0.min(image_width.saturating_sub(1));
        let y = y0.min(image_height.saturating_sub(1));
        CropRegion {
            x,
            y,
            width: x1.saturating_sub(x).max(1),
            height: y1.saturating_sub(y).max(1),
        }
    }

    fn scaled(&self, factor: u32) -> Self {
        CropRegion {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

pub struct GfpganRestorer<N = OnnxModel, D = UltraFaceDetector> {
    network: N,
    detector: D,
    upscale: u32,
    background: Option<Arc<dyn SuperResolution>>,
}

impl<N: FaceNetwork, D: FaceDetector> GfpganRestorer<N, D> {
    pub fn new(
        network: N,
        detector: D,
        upscale: u32,
        background: Option<Arc<dyn SuperResolution>>,
    ) -> Self {
        GfpganRestorer {
            network,
            detector,
            upscale: upscale.max(1),
            background,
        }
    }

    fn restore_crop(&self, crop: &RgbImage) -> Result<RgbImage, InferenceError> {
        let face = if crop.dimensions() == (FACE_SIZE, FACE_SIZE) {
            crop.clone()
        } else {
            imageops::resize(crop, FACE_SIZE, FACE_SIZE, imageops::FilterType::Lanczos3)
        };

        let restored = self.network.restore_face(&face)?;
        if restored.dimensions() != (FACE_SIZE, FACE_SIZE) {
            return Err(InferenceError::new(format!(
                "Face network returned {}x{}, expected {}x{}",
                restored.width(),
                restored.height(),
                FACE_SIZE,
                FACE_SIZE
            )));
        }
        Ok(restored)
    }

    fn upsample_background(&self, image: &PixelBuffer) -> Result<RgbImage, InferenceError> {
        let target = (image.width() * self.upscale, image.height() * self.upscale);
        if self.upscale == 1 {
            return Ok(image.to_rgb_image());
        }

        let canvas = match &self.background {
            Some(upsampler) => upsampler.upscale(image, self.upscale)?.into_rgb_image(),
            None => imageops::resize(
                &image.to_rgb_image(),
                target.0,
                target.1,
                imageops::FilterType::Lanczos3,
            ),
        };

        if canvas.dimensions() == target {
            Ok(canvas)
        } else {
            Ok(imageops::resize(
                &canvas,
                target.0,
                target.1,
                imageops::FilterType::Lanczos3,
            ))
        }
    }
}

impl<N: FaceNetwork, D: FaceDetector> FaceRestoration for GfpganRestorer<N, D> {
    fn restore(
        &self,
        image: &PixelBuffer,
        params: &FaceRestoreParams,
    ) -> Result<PixelBuffer, InferenceError> {
        let input = image.to_rgb_image();

        // An aligned input is the face itself; there is no background to paste onto.
        if params.already_aligned {
            let restored = self.restore_crop(&input)?;
            return PixelBuffer::from_rgb_image(restored).map_err(InferenceError);
        }

        let mut faces = self.detector.detect(&input)?;
        if params.only_center_face {
            let (cx, cy) = (input.width() as f32 / 2.0, input.height() as f32 / 2.0);
            let distance = |f: &FaceBox| {
                let (fx, fy) = f.center();
                (fx - cx).powi(2) + (fy - cy).powi(2)
            };
            faces.sort_by(|a, b| {
                distance(a)
                    .partial_cmp(&distance(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            faces.truncate(1);
        }
        debug!("Detected {} face(s)", faces.len());

        let mut restored_faces = Vec::with_capacity(faces.len());
        for face in &faces {
            let region = CropRegion::around(face, input.width(), input.height());
            let crop =
                imageops::crop_imm(&input, region.x, region.y, region.width, region.height)
                    .to_image();
            restored_faces.push((region, self.restore_crop(&crop)?));
        }

        if !params.paste_back {
            if let Some((_, face)) = restored_faces.into_iter().next() {
                return PixelBuffer::from_rgb_image(face).map_err(InferenceError);
            }
            let canvas = self.upsample_background(image)?;
            return PixelBuffer::from_rgb_image(canvas).map_err(InferenceError);
        }

        let mut canvas = self.upsample_background(image)?;
        for (region, face) in &restored_faces {
            paste_face(&mut canvas, face, region.scaled(self.upscale));
        }

        PixelBuffer::from_rgb_image(canvas).map_err(InferenceError)
    }
}

// Blends `face` into `region` of `canvas`, fading out towards the region edges.
fn paste_face(canvas: &mut RgbImage, face: &RgbImage, region: CropRegion) {
    let width = region.width.min(canvas.width().saturating_sub(region.x));
    let height = region.height.min(canvas.height().saturating_sub(region.y));
    if width == 0 || height == 0 {
        return;
    }

    let resized = imageops::resize(
        face,
        region.width,
        region.height,
        imageops::FilterType::Lanczos3,
    );
    let feather = (region.width.min(region.height) as f32 / 10.0).max(1.0);

    for y in 0..height {
        for x in 0..width {
            let edge = (x + 1)
                .min(y + 1)
                .min(region.width - x)
                .min(region.height - y) as f32;
            let alpha = (edge / feather).min(1.0);

            let src = resized.get_pixel(x, y).0;
            let dst = canvas.get_pixel_mut(region.x + x, region.y + y);
            let blended: [u8; 3] = std::array::from_fn(|c| {
                (f32::from(src[c]) * alpha + f32::from(dst.0[c]) * (1.0 - alpha)).round() as u8
            });
            *dst = Rgb(blended);
        }
    }
}

/// Acquires GFPGAN and its face detector from the weight cache.
pub struct GfpganSource {
    cache: Arc<WeightCache>,
    restorer_weights: WeightFile,
    detector_weights: WeightFile,
    upscale: u32,
}

impl GfpganSource {
    pub fn new(
        cache: Arc<WeightCache>,
        restorer: (Option<String>, Option<String>),
        detector_url: Option<String>,
        upscale: u32,
    ) -> Self {
        let (url, blake3) = restorer;
        GfpganSource {
            cache,
            restorer_weights: WeightFile::new(MODEL_FILENAME)
                .with_url(url)
                .with_blake3(blake3)
                .with_min_size(MIN_MODEL_SIZE_BYTES),
            detector_weights: WeightFile::new(DETECTOR_FILENAME)
                .with_url(detector_url)
                .with_min_size(MIN_DETECTOR_SIZE_BYTES),
            upscale,
        }
    }
}

impl FaceRestorationSource for GfpganSource {
    async fn acquire(
        &self,
        background: Option<Arc<dyn SuperResolution>>,
    ) -> Result<Arc<dyn FaceRestoration>, LoadError> {
        let restorer_path = self.cache.ensure(&self.restorer_weights).await?;
        let detector_path = self.cache.ensure(&self.detector_weights).await?;

        let (network, detector) = tokio::task::spawn_blocking(move || {
            let network = OnnxModel::load("gfpgan-v1.4", &restorer_path)?;
            let detector = OnnxModel::load("ultraface-rfb-320", &detector_path)?;
            Ok::<_, LoadError>((network, UltraFaceDetector::new(detector)))
        })
        .await
        .map_err(|e| LoadError::Model(format!("Model load task failed: {}", e)))??;

        Ok(Arc::new(GfpganRestorer::new(
            network,
            detector,
            self.upscale,
            background,
        )))
    }
}
