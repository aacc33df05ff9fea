// ONNX Runtime adapters behind the capability traits.

mod face_detect;
mod gfpgan;
mod onnx;
mod realesrgan;

pub use face_detect::DEFAULT_DETECTOR_URL;
pub use gfpgan::{DEFAULT_MODEL_URL as DEFAULT_FACE_RESTORATION_URL, GfpganSource};
pub use realesrgan::{
    DEFAULT_MODEL_URL as DEFAULT_SUPER_RESOLUTION_URL, RealEsrganSource, TileConfig,
};
