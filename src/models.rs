// Core data structures passed between the codec, the pipeline and the
// capability adapters.

use image::RgbImage;
use std::fmt;

/// Three-channel, 8-bit raster image in RGB order.
///
/// RGB is the only channel order inside the service; the codec converts every
/// input format to it on decode. Width and height are always non-zero.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    raster: RgbImage,
}

impl PixelBuffer {
    /// Wraps raw interleaved RGB data. Fails on zero dimensions or when the
    /// data length is not `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("Invalid image dimensions: {}x{}", width, height));
        }
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        let raster = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            format!(
                "Pixel data length {} does not match {}x{}x3 = {}",
                actual, width, height, expected
            )
        })?;
        Ok(PixelBuffer { raster })
    }

    /// Takes ownership of an RGB image. Fails on zero dimensions.
    pub fn from_rgb_image(image: RgbImage) -> Result<Self, String> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// `(height, width, channels)`, the way shapes show up in the logs.
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.height(), self.width(), 3)
    }

    /// Interleaved RGB bytes, row by row.
    pub fn as_raw(&self) -> &[u8] {
        self.raster.as_raw()
    }

    /// Copies the pixels out as an RGB image.
    pub fn to_rgb_image(&self) -> RgbImage {
        self.raster.clone()
    }

    pub fn into_rgb_image(self) -> RgbImage {
        self.raster
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A validated enhancement request as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementRequest {
    /// Base64 image, optionally with a data-URL prefix.
    pub image: String,
    /// Upscale factor in 1..=4.
    pub scale: u32,
    /// Run face restoration in the combined pipeline.
    pub enhance_face: bool,
    /// Accepted for client compatibility. No operation reads it yet.
    pub denoise_strength: f32,
}

impl EnhancementRequest {
    pub const DEFAULT_SCALE: u32 = 2;
    pub const DEFAULT_DENOISE_STRENGTH: f32 = 0.5;

    pub fn new(image: impl Into<String>) -> Self {
        EnhancementRequest {
            image: image.into(),
            scale: Self::DEFAULT_SCALE,
            enhance_face: false,
            denoise_strength: Self::DEFAULT_DENOISE_STRENGTH,
        }
    }
}

/// Encoded output of a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementResult {
    pub image: String,
    // Dimensions of the output buffer, not the input.
    pub width: u32,
    pub height: u32,
    pub message: String,
}
