// Real-ESRGAN x4plus super-resolution over ONNX Runtime.
//
// The network always upscales by 4. Other requested factors are reached by
// resizing the x4 result with Lanczos3. Large inputs can be processed in
// overlapping tiles to bound memory use.

use super::onnx::{Normalization, OnnxModel, image_to_tensor, tensor_to_image};
use crate::capability::{SuperResolution, SuperResolutionSource, WeightCache, WeightFile};
use crate::error::{InferenceError, LoadError};
use crate::models::PixelBuffer;
use image::{GenericImage, RgbImage, imageops};
use std::sync::Arc;
use tracing::debug;

/// Well-known cache filename of the Real-ESRGAN weights.
pub const MODEL_FILENAME: &str = "RealESRGAN_x4plus.onnx";

/// Default URL for downloading the Real-ESRGAN x4 ONNX export.
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/facefusion/facefusion-assets/releases/download/models/real_esrgan_x4.onnx";

/// Native scale factor of the x4plus network.
pub const NATIVE_SCALE: u32 = 4;

// The x4plus export is roughly 64 MB; anything far below that is an error page.
const MIN_MODEL_SIZE_BYTES: u64 = 1_000_000;

/// Tiling parameters. `tile == 0` processes the whole image at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    pub tile: u32,
    pub tile_pad: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        TileConfig {
            tile: 0,
            tile_pad: 10,
        }
    }
}

/// Runs one forward pass of a x`NATIVE_SCALE` network.
pub trait UpscaleNetwork: Send + Sync {
    fn forward(&self, image: &RgbImage) -> Result<RgbImage, InferenceError>;
}

impl UpscaleNetwork for OnnxModel {
    fn forward(&self, image: &RgbImage) -> Result<RgbImage, InferenceError> {
        let outputs = self.run(image_to_tensor(image, Normalization::UNIT))?;
        tensor_to_image(&outputs[0], Normalization::UNIT)
    }
}

pub struct RealEsrganUpscaler<N = OnnxModel> {
    network: N,
    tiles: TileConfig,
}

impl<N: UpscaleNetwork> RealEsrganUpscaler<N> {
    pub fn new(network: N, tiles: TileConfig) -> Self {
        RealEsrganUpscaler { network, tiles }
    }

    // Native x4 pass, whole image or tiled.
    fn upscale_native(&self, image: &RgbImage) -> Result<RgbImage, InferenceError> {
        let output = if self.tiles.tile == 0 {
            self.network.forward(image)?
        } else {
            self.upscale_tiled(image)?
        };

        let expected = (image.width() * NATIVE_SCALE, image.height() * NATIVE_SCALE);
        if output.dimensions() != expected {
            return Err(InferenceError::new(format!(
                "Unexpected output size: {}x{}, expected {}x{}",
                output.width(),
                output.height(),
                expected.0,
                expected.1
            )));
        }
        Ok(output)
    }

    fn upscale_tiled(&self, image: &RgbImage) -> Result<RgbImage, InferenceError> {
        let (width, height) = image.dimensions();
        let TileConfig { tile, tile_pad } = self.tiles;
        let scale = NATIVE_SCALE;

        let mut output = RgbImage::new(width * scale, height * scale);
        let tiles_x = width.div_ceil(tile);
        let tiles_y = height.div_ceil(tile);
        debug!("Tiled upscale: {}x{} tiles of {}px", tiles_x, tiles_y, tile);

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                // Area of the input this tile is responsible for.
                let x0 = tx * tile;
                let y0 = ty * tile;
                let x1 = (x0 + tile).min(width);
                let y1 = (y0 + tile).min(height);

                // Same area grown by the padding, clipped to the image.
                let px0 = x0.saturating_sub(tile_pad);
                let py0 = y0.saturating_sub(tile_pad);
                let px1 = (x1 + tile_pad).min(width);
                let py1 = (y1 + tile_pad).min(height);

                let input_tile =
                    imageops::crop_imm(image, px0, py0, px1 - px0, py1 - py0).to_image();
                let output_tile = self.network.forward(&input_tile)?;
                let expected = (input_tile.width() * scale, input_tile.height() * scale);
                if output_tile.dimensions() != expected {
                    return Err(InferenceError::new(format!(
                        "Tile ({}, {}) came back as {}x{}",
                        tx,
                        ty,
                        output_tile.width(),
                        output_tile.height()
                    )));
                }

                // Drop the padding before writing the tile into place.
                let inner = imageops::crop_imm(
                    &output_tile,
                    (x0 - px0) * scale,
                    (y0 - py0) * scale,
                    (x1 - x0) * scale,
                    (y1 - y0) * scale,
                );
                output.copy_from(&inner.to_image(), x0 * scale, y0 * scale)?;
            }
        }

        Ok(output)
    }
}

impl<N: UpscaleNetwork> SuperResolution for RealEsrganUpscaler<N> {
    fn upscale(&self, image: &PixelBuffer, scale: u32) -> Result<PixelBuffer, InferenceError> {
        if scale == 0 {
            return Err(InferenceError::new("Scale must be at least 1"));
        }

        let input = image.to_rgb_image();
        let native = self.upscale_native(&input)?;

        let target = (input.width() * scale, input.height() * scale);
        let output = if native.dimensions() == target {
            native
        } else {
            debug!(
                "Resizing x{} output {:?} to {:?}",
                NATIVE_SCALE,
                native.dimensions(),
                target
            );
            imageops::resize(&native, target.0, target.1, imageops::FilterType::Lanczos3)
        };

        PixelBuffer::from_rgb_image(output).map_err(InferenceError)
    }
}

/// Acquires Real-ESRGAN: weights from the cache, then an ONNX session.
pub struct RealEsrganSource {
    cache: Arc<WeightCache>,
    weights: WeightFile,
    tiles: TileConfig,
}

impl RealEsrganSource {
    pub fn new(
        cache: Arc<WeightCache>,
        url: Option<String>,
        blake3: Option<String>,
        tiles: TileConfig,
    ) -> Self {
        let weights = WeightFile::new(MODEL_FILENAME)
            .with_url(url)
            .with_blake3(blake3)
            .with_min_size(MIN_MODEL_SIZE_BYTES);
        RealEsrganSource {
            cache,
            weights,
            tiles,
        }
    }
}

impl SuperResolutionSource for RealEsrganSource {
    async fn acquire(&self) -> Result<Arc<dyn SuperResolution>, LoadError> {
        let path = self.cache.ensure(&self.weights).await?;
        let model = tokio::task::spawn_blocking(move || OnnxModel::load("realesrgan-x4plus", &path))
            .await
            .map_err(|e| LoadError::Model(format!("Model load task failed: {}", e)))??;

        Ok(Arc::new(RealEsrganUpscaler::new(model, self.tiles)))
    }
}
