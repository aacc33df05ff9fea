// Conversion between base64 (optionally data-URL wrapped) payloads and
// in-memory pixel buffers.

use crate::error::EnhanceError;
use crate::models::PixelBuffer;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{
    ExtendedColorType, ImageEncoder, ImageFormat,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};
use tracing::debug;

/// Prefix of every encoded output, so clients can use it as an `<img src>` directly.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Decodes a base64 image into a canonical RGB buffer.
///
/// Anything up to and including the first comma is treated as a data-URL
/// header and discarded; a recognised image media type in that header is
/// used as a format hint.
pub fn decode(encoded: &str) -> Result<PixelBuffer, EnhanceError> {
    let (header, payload) = match encoded.split_once(',') {
        Some((header, payload)) => (Some(header), payload),
        None => (None, encoded),
    };

    // MIME-wrapped base64 may carry line breaks.
    let payload: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| EnhanceError::Decode(format!("Invalid base64 payload: {}", e)))?;

    let hint = header.and_then(format_hint);
    let dyn_img = match hint {
        Some(format) => image::load_from_memory_with_format(&bytes, format).or_else(|e| {
            debug!(
                "Image did not decode as hinted {:?} ({}), falling back to detection.",
                format, e
            );
            image::load_from_memory(&bytes)
        }),
        None => image::load_from_memory(&bytes),
    }
    .map_err(|e| EnhanceError::Decode(format!("Unrecognized image data: {}", e)))?;

    // Grey, alpha and 16-bit inputs all end up as plain 8-bit RGB.
    let buffer = PixelBuffer::from_rgb_image(dyn_img.to_rgb8()).map_err(EnhanceError::Decode)?;
    debug!(
        "Decoded {} byte payload into {}x{} buffer.",
        bytes.len(),
        buffer.width(),
        buffer.height()
    );
    Ok(buffer)
}

/// Encodes a buffer as a PNG data URL.
pub fn encode(buffer: &PixelBuffer) -> Result<String, EnhanceError> {
    let mut png_bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut png_bytes, CompressionType::Best, FilterType::Adaptive);
    encoder
        .write_image(
            buffer.as_raw(),
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| EnhanceError::Internal(format!("PNG encoding failed: {}", e)))?;

    debug!(
        "Encoded {}x{} buffer as {} byte PNG.",
        buffer.width(),
        buffer.height(),
        png_bytes.len()
    );

    let mut out = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png_bytes.len() * 4 / 3 + 4);
    out.push_str(PNG_DATA_URL_PREFIX);
    STANDARD.encode_string(&png_bytes, &mut out);
    Ok(out)
}

// Maps a data-URL header such as `data:image/png;base64` to an image format.
fn format_hint(header: &str) -> Option<ImageFormat> {
    let media_type = header.trim().strip_prefix("data:")?;
    let media_type = media_type
        .strip_suffix(";base64")
        .unwrap_or(media_type)
        .trim();
    let mime: mime::Mime = media_type.parse().ok()?;
    if mime.type_() != mime::IMAGE {
        return None;
    }

    match mime.subtype().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
        "webp" => Some(ImageFormat::WebP),
        "gif" => Some(ImageFormat::Gif),
        "bmp" | "x-bmp" => Some(ImageFormat::Bmp),
        "tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}
