// Composes the capabilities into the four public operations.
//
// Every operation is synchronous and CPU bound; callers on the async runtime
// run it on the blocking pool.

use crate::capability::{Capability, CapabilityRegistry, FaceRestoreParams};
use crate::error::EnhanceError;
use crate::image_codec;
use crate::models::{EnhancementRequest, EnhancementResult, PixelBuffer};
use std::sync::Arc;
use tracing::debug;

pub struct Pipeline {
    registry: Arc<CapabilityRegistry>,
}

impl Pipeline {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Pipeline { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Super-resolution at the requested scale.
    pub fn enhance(&self, request: &EnhancementRequest) -> Result<EnhancementResult, EnhanceError> {
        self.require(Capability::SuperResolution)?;

        let input = decode(request)?;
        let output = self.super_resolve(&input, request.scale)?;
        finish(&output, "Enhancement successful".to_string())
    }

    /// Same as [`Pipeline::enhance`], reporting the factor in the message.
    pub fn upscale(&self, request: &EnhancementRequest) -> Result<EnhancementResult, EnhanceError> {
        self.require(Capability::SuperResolution)?;

        let input = decode(request)?;
        let output = self.super_resolve(&input, request.scale)?;
        finish(&output, format!("Upscaled to {}x", request.scale))
    }

    /// Face restoration only. `scale` is ignored.
    pub fn enhance_face(
        &self,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, EnhanceError> {
        self.require(Capability::FaceRestoration)?;

        let input = decode(request)?;
        let output = self.restore_faces(&input)?;
        finish(&output, "Face enhancement successful".to_string())
    }

    /// Optional face restoration followed by optional super-resolution.
    /// Stages whose capability is unavailable are skipped.
    pub fn process(&self, request: &EnhancementRequest) -> Result<EnhancementResult, EnhanceError> {
        let mut buffer = decode(request)?;

        if !request.enhance_face {
            debug!("Face restoration not requested");
        } else if self.registry.is_available(Capability::FaceRestoration) {
            buffer = self.restore_faces(&buffer)?;
        } else {
            debug!("Skipping face restoration: capability unavailable");
        }

        if self.registry.is_available(Capability::SuperResolution) {
            buffer = self.super_resolve(&buffer, request.scale)?;
        } else {
            debug!("Skipping super-resolution: capability unavailable");
        }

        finish(&buffer, "Processing complete".to_string())
    }

    fn require(&self, capability: Capability) -> Result<(), EnhanceError> {
        if self.registry.is_available(capability) {
            Ok(())
        } else {
            Err(EnhanceError::CapabilityUnavailable(capability))
        }
    }

    fn super_resolve(&self, input: &PixelBuffer, scale: u32) -> Result<PixelBuffer, EnhanceError> {
        debug!("Super-resolution x{} on {:?}", scale, input.shape());
        let output = self.registry.super_resolve(input, scale)?;
        debug!("Super-resolution done: {:?}", output.shape());
        Ok(output)
    }

    fn restore_faces(&self, input: &PixelBuffer) -> Result<PixelBuffer, EnhanceError> {
        debug!("Face restoration on {:?}", input.shape());
        let output = self
            .registry
            .restore_faces(input, &FaceRestoreParams::default())?;
        debug!("Face restoration done: {:?}", output.shape());
        Ok(output)
    }
}

fn decode(request: &EnhancementRequest) -> Result<PixelBuffer, EnhanceError> {
    let buffer = image_codec::decode(&request.image)?;
    debug!("Decoded input: {:?}", buffer.shape());
    Ok(buffer)
}

fn finish(output: &PixelBuffer, message: String) -> Result<EnhancementResult, EnhanceError> {
    let image = image_codec::encode(output)?;
    debug!("Encoded output: {:?}", output.shape());

    Ok(EnhancementResult {
        image,
        width: output.width(),
        height: output.height(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FaceRestoration, SuperResolution};
    use crate::error::{ErrorKind, InferenceError, LoadError};
    use image::{Rgb, RgbImage, imageops};
    use std::sync::Mutex;
    use tokio_test::assert_err;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    struct Multiply {
        log: CallLog,
    }

    impl SuperResolution for Multiply {
        fn upscale(&self, image: &PixelBuffer, scale: u32) -> Result<PixelBuffer, InferenceError> {
            self.log.lock().unwrap().push("super_resolution");
            let rgb = imageops::resize(
                &image.to_rgb_image(),
                image.width() * scale,
                image.height() * scale,
                imageops::FilterType::Nearest,
            );
            PixelBuffer::from_rgb_image(rgb).map_err(InferenceError)
        }
    }

    struct Invert {
        log: CallLog,
    }

    impl FaceRestoration for Invert {
        fn restore(
            &self,
            image: &PixelBuffer,
            _params: &FaceRestoreParams,
        ) -> Result<PixelBuffer, InferenceError> {
            self.log.lock().unwrap().push("face_restoration");
            let mut rgb = image.to_rgb_image();
            imageops::invert(&mut rgb);
            PixelBuffer::from_rgb_image(rgb).map_err(InferenceError)
        }
    }

    struct Failing;

    impl SuperResolution for Failing {
        fn upscale(
            &self,
            _image: &PixelBuffer,
            _scale: u32,
        ) -> Result<PixelBuffer, InferenceError> {
            Err(InferenceError::new("out of memory"))
        }
    }

    fn pipeline(super_resolution: bool, face_restoration: bool) -> (Pipeline, CallLog) {
        let log = CallLog::default();
        let mut registry = CapabilityRegistry::new();
        registry.register_super_resolution(if super_resolution {
            Ok(Arc::new(Multiply { log: log.clone() }))
        } else {
            Err(LoadError::MissingWeights {
                filename: "sr.onnx".into(),
            })
        });
        registry.register_face_restoration(if face_restoration {
            Ok(Arc::new(Invert { log: log.clone() }))
        } else {
            Err(LoadError::MissingWeights {
                filename: "fr.onnx".into(),
            })
        });
        (Pipeline::new(Arc::new(registry)), log)
    }

    fn sample(width: u32, height: u32) -> String {
        let rgb = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 42]));
        image_codec::encode(&PixelBuffer::from_rgb_image(rgb).unwrap()).unwrap()
    }

    fn request(image: String, scale: u32) -> EnhancementRequest {
        EnhancementRequest {
            scale,
            ..EnhancementRequest::new(image)
        }
    }

    #[test]
    fn test_upscale_reports_output_dimensions() {
        let (pipeline, _) = pipeline(true, false);
        let result = pipeline.upscale(&request(sample(100, 80), 3)).unwrap();

        assert_eq!((result.width, result.height), (300, 240));
        assert_eq!(result.message, "Upscaled to 3x");

        let decoded = image_codec::decode(&result.image).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 240));
    }

    #[test]
    fn test_enhance_message() {
        let (pipeline, _) = pipeline(true, false);
        let result = pipeline.enhance(&request(sample(8, 8), 2)).unwrap();
        assert_eq!(result.message, "Enhancement successful");
        assert_eq!((result.width, result.height), (16, 16));
    }

    #[test]
    fn test_unavailable_is_reported_before_decoding() {
        let (pipeline, _) = pipeline(false, false);
        let malformed = request("not base64 at all!".into(), 2);

        for result in [pipeline.enhance(&malformed), pipeline.upscale(&malformed)] {
            assert_eq!(
                assert_err!(result),
                EnhanceError::CapabilityUnavailable(Capability::SuperResolution)
            );
        }
        assert_eq!(
            pipeline.enhance_face(&malformed).unwrap_err(),
            EnhanceError::CapabilityUnavailable(Capability::FaceRestoration)
        );
    }

    #[test]
    fn test_enhance_face_ignores_scale() {
        let (pipeline, log) = pipeline(true, true);
        let result = pipeline.enhance_face(&request(sample(10, 6), 4)).unwrap();

        assert_eq!((result.width, result.height), (10, 6));
        assert_eq!(result.message, "Face enhancement successful");
        assert_eq!(*log.lock().unwrap(), vec!["face_restoration"]);
    }

    #[test]
    fn test_process_passes_through_when_nothing_is_available() {
        let (pipeline, _) = pipeline(false, false);
        let input = sample(12, 7);
        let result = pipeline
            .process(&EnhancementRequest {
                enhance_face: true,
                ..request(input.clone(), 4)
            })
            .unwrap();

        assert_eq!(result.message, "Processing complete");
        assert_eq!((result.width, result.height), (12, 7));
        assert_eq!(
            image_codec::decode(&result.image).unwrap(),
            image_codec::decode(&input).unwrap()
        );
    }

    #[test]
    fn test_process_restores_faces_before_upscaling() {
        let (pipeline, log) = pipeline(true, true);
        let result = pipeline
            .process(&EnhancementRequest {
                enhance_face: true,
                ..request(sample(5, 5), 2)
            })
            .unwrap();

        assert_eq!((result.width, result.height), (10, 10));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["face_restoration", "super_resolution"]
        );
    }

    #[test]
    fn test_process_skips_faces_unless_requested() {
        let (pipeline, log) = pipeline(true, true);
        pipeline.process(&request(sample(5, 5), 2)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["super_resolution"]);
    }

    #[test]
    fn test_malformed_payload_is_a_decode_error() {
        let (pipeline, _) = pipeline(true, true);
        let err = pipeline
            .upscale(&request("data:image/png;base64,@@@@".into(), 2))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("decode"));
    }

    #[test]
    fn test_inference_failure_is_not_swallowed_by_process() {
        let mut registry = CapabilityRegistry::new();
        registry.register_super_resolution(Ok(Arc::new(Failing)));
        let pipeline = Pipeline::new(Arc::new(registry));

        let err = pipeline.process(&request(sample(4, 4), 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("out of memory"));
    }
}
