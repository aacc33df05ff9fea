// Thin wrapper around an ONNX Runtime session plus the NCHW tensor
// conversions shared by the model adapters.

use crate::error::{InferenceError, LoadError};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// A named output tensor copied out of the session.
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

/// Maps an 8-bit channel value into the range a model expects, and back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: f32,
    pub std: f32,
}

impl Normalization {
    /// `[0, 255] -> [0, 1]`
    pub const UNIT: Normalization = Normalization {
        mean: 0.0,
        std: 255.0,
    };
    /// `[0, 255] -> [-1, 1]`
    pub const SYMMETRIC: Normalization = Normalization {
        mean: 127.5,
        std: 127.5,
    };
    /// UltraFace input convention.
    pub const ULTRAFACE: Normalization = Normalization {
        mean: 127.0,
        std: 128.0,
    };

    fn forward(&self, value: u8) -> f32 {
        (f32::from(value) - self.mean) / self.std
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn inverse(&self, value: f32) -> u8 {
        (value * self.std + self.mean).clamp(0.0, 255.0).round() as u8
    }
}

/// An ONNX session. `Session::run` needs `&mut`, so calls are serialised.
pub struct OnnxModel {
    name: String,
    input_name: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    pub fn load(name: &str, path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            return Err(LoadError::Io(format!("Model file not found: {:?}", path)));
        }

        let session = Session::builder()
            .map_err(|e| LoadError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| LoadError::Model(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| LoadError::Model(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "input".to_string(), |i| i.name.clone());

        debug!(
            "ONNX model '{}' loaded from {:?} (input '{}')",
            name, path, input_name
        );

        Ok(OnnxModel {
            name: name.to_string(),
            input_name,
            session: Mutex::new(session),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the model on a single NCHW tensor and copies every output out.
    pub fn run(&self, input: Array4<f32>) -> Result<Vec<OutputTensor>, InferenceError> {
        let input = input.as_standard_layout().into_owned();

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::new(format!("{}: session lock poisoned", self.name)))?;

        let input_ref = ort::value::TensorRef::from_array_view(&input)
            .map_err(|e| InferenceError::new(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_ref])
            .map_err(|e| InferenceError::new(e.to_string()))?;

        let mut tensors = Vec::new();
        for (name, value) in outputs.iter() {
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e: ort::Error| InferenceError::new(e.to_string()))?;
            tensors.push(OutputTensor {
                name: name.to_string(),
                shape: shape.iter().copied().collect(),
                data: data.to_vec(),
            });
        }

        if tensors.is_empty() {
            return Err(InferenceError::new(format!(
                "{}: model produced no outputs",
                self.name
            )));
        }
        Ok(tensors)
    }
}

/// Converts an RGB image to a `1x3xHxW` tensor.
pub fn image_to_tensor(image: &RgbImage, norm: Normalization) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y as usize, x as usize]] = norm.forward(r);
        tensor[[0, 1, y as usize, x as usize]] = norm.forward(g);
        tensor[[0, 2, y as usize, x as usize]] = norm.forward(b);
    }

    tensor
}

/// Converts a `1x3xHxW` output tensor back to an RGB image.
pub fn tensor_to_image(
    output: &OutputTensor,
    norm: Normalization,
) -> Result<RgbImage, InferenceError> {
    if output.shape.len() != 4 || output.shape[0] != 1 || output.shape[1] != 3 {
        return Err(InferenceError::new(format!(
            "Expected a 1x3xHxW tensor, got shape {:?}",
            output.shape
        )));
    }

    let height = u32::try_from(output.shape[2])
        .map_err(|_| InferenceError::new("Invalid tensor height"))?;
    let width = u32::try_from(output.shape[3])
        .map_err(|_| InferenceError::new("Invalid tensor width"))?;
    let plane = width as usize * height as usize;
    if output.data.len() != plane * 3 {
        return Err(InferenceError::new(format!(
            "Tensor data length {} does not match shape {:?}",
            output.data.len(),
            output.shape
        )));
    }

    let data = &output.data;
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let idx = y as usize * width as usize + x as usize;
        Rgb([
            norm.inverse(data[idx]),
            norm.inverse(data[plane + idx]),
            norm.inverse(data[2 * plane + idx]),
        ])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_to_tensor_shape_and_values() {
        let mut image = RgbImage::new(4, 2);
        image.put_pixel(3, 1, Rgb([255, 0, 51]));

        let tensor = image_to_tensor(&image, Normalization::UNIT);
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert_eq!(tensor[[0, 0, 1, 3]], 1.0);
        assert_eq!(tensor[[0, 1, 1, 3]], 0.0);
        assert!((tensor[[0, 2, 1, 3]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_normalization_range() {
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]));
        let tensor = image_to_tensor(&image, Normalization::SYMMETRIC);
        assert_eq!(tensor[[0, 0, 0, 0]], -1.0);
        assert_eq!(tensor[[0, 1, 0, 0]], 1.0);
    }

    #[test]
    fn test_tensor_round_trip() {
        let image = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8 * 40, y as u8 * 80, 7]));
        let tensor = image_to_tensor(&image, Normalization::SYMMETRIC);
        let output = OutputTensor {
            name: "output".into(),
            shape: tensor.shape().iter().map(|&d| d as i64).collect(),
            data: tensor.iter().copied().collect(),
        };

        let back = tensor_to_image(&output, Normalization::SYMMETRIC).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_tensor_to_image_clamps() {
        let output = OutputTensor {
            name: "output".into(),
            shape: vec![1, 3, 1, 1],
            data: vec![1.7, -0.3, 0.5],
        };
        let image = tensor_to_image(&output, Normalization::UNIT).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 128]);
    }

    #[test]
    fn test_tensor_to_image_rejects_bad_shape() {
        let output = OutputTensor {
            name: "output".into(),
            shape: vec![1, 4, 2, 2],
            data: vec![0.0; 16],
        };
        assert!(tensor_to_image(&output, Normalization::UNIT).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = OnnxModel::load("missing", Path::new("/nonexistent/model.onnx"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
