use super::{MAX_IMAGE_SIZE_BYTES, SharedPipeline, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(pipeline: SharedPipeline) -> Router {
    // Configure the router with all API endpoints
    Router::new()
        // Status and liveness
        .route("/", get(handlers::status))
        .route("/health", get(handlers::health))
        // Enhancement operations
        .route("/enhance", post(handlers::enhance))
        .route("/upscale", post(handlers::upscale))
        .route("/enhance-face", post(handlers::enhance_face))
        .route("/process", post(handlers::process))
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE_BYTES))
        // Any origin may call the API
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        // Provide the shared state
        .with_state(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityRegistry, FaceRestoration, FaceRestorationSource, FaceRestoreParams,
        SuperResolution, SuperResolutionSource, load_all,
    };
    use crate::error::{InferenceError, LoadError};
    use crate::image_codec;
    use crate::models::PixelBuffer;
    use crate::pipeline::Pipeline;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use image::{Rgb, RgbImage, imageops};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Multiply;

    impl SuperResolution for Multiply {
        fn upscale(&self, image: &PixelBuffer, scale: u32) -> Result<PixelBuffer, InferenceError> {
            let rgb = imageops::resize(
                &image.to_rgb_image(),
                image.width() * scale,
                image.height() * scale,
                imageops::FilterType::Nearest,
            );
            PixelBuffer::from_rgb_image(rgb).map_err(InferenceError)
        }
    }

    struct Identity;

    impl FaceRestoration for Identity {
        fn restore(
            &self,
            image: &PixelBuffer,
            _params: &FaceRestoreParams,
        ) -> Result<PixelBuffer, InferenceError> {
            Ok(image.clone())
        }
    }

    struct SuperResolutionStub {
        fail: bool,
    }

    impl SuperResolutionSource for SuperResolutionStub {
        async fn acquire(&self) -> Result<Arc<dyn SuperResolution>, LoadError> {
            if self.fail {
                Err(LoadError::MissingWeights {
                    filename: "RealESRGAN_x4plus.onnx".into(),
                })
            } else {
                Ok(Arc::new(Multiply))
            }
        }
    }

    struct FaceRestorationStub {
        fail: bool,
    }

    impl FaceRestorationSource for FaceRestorationStub {
        async fn acquire(
            &self,
            _background: Option<Arc<dyn SuperResolution>>,
        ) -> Result<Arc<dyn FaceRestoration>, LoadError> {
            if self.fail {
                Err(LoadError::Model("bad graph".into()))
            } else {
                Ok(Arc::new(Identity))
            }
        }
    }

    async fn app_with(super_resolution: bool, face_restoration: bool) -> Router {
        let registry = load_all(
            &SuperResolutionStub {
                fail: !super_resolution,
            },
            &FaceRestorationStub {
                fail: !face_restoration,
            },
        )
        .await;
        create_app(Arc::new(Pipeline::new(Arc::new(registry))))
    }

    fn sample_payload(width: u32, height: u32) -> String {
        let rgb = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        image_codec::encode(&PixelBuffer::from_rgb_image(rgb).unwrap()).unwrap()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_status_reflects_load_outcomes() {
        let (status, body) = get_json(app_with(false, true).await, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "status": "running",
                "superResolutionAvailable": false,
                "faceRestorationAvailable": true,
            })
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app_with(false, false).await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn test_upscale() {
        let (status, body) = post_json(
            app_with(true, false).await,
            "/upscale",
            json!({ "image": sample_payload(100, 80), "scale": 3 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["width"], 300);
        assert_eq!(body["height"], 240);
        assert_eq!(body["message"], "Upscaled to 3x");

        let decoded = image_codec::decode(body["image"].as_str().unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 240));
    }

    #[tokio::test]
    async fn test_unavailable_is_503_even_for_garbage_payload() {
        for uri in ["/enhance", "/upscale"] {
            let (status, body) = post_json(
                app_with(false, true).await,
                uri,
                json!({ "image": "%%% definitely not base64 %%%" }),
            )
            .await;

            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["error"]["status"], 503);
            assert_eq!(body["error"]["message"], "SuperResolution model not loaded");
        }

        let (status, _) = post_json(
            app_with(true, false).await,
            "/enhance-face",
            json!({ "image": "%%%" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_malformed_base64_is_500() {
        let (status, body) = post_json(
            app_with(true, true).await,
            "/enhance",
            json!({ "image": "data:image/png;base64,!!!" }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("decode"), "message: {}", message);
    }

    #[tokio::test]
    async fn test_process_without_capabilities_succeeds() {
        let (status, body) = post_json(
            app_with(false, false).await,
            "/process",
            json!({ "image": sample_payload(6, 4), "enhance_face": true, "scale": 4 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["width"], 6);
        assert_eq!(body["height"], 4);
        assert_eq!(body["message"], "Processing complete");
    }

    #[tokio::test]
    async fn test_invalid_scale_is_400() {
        let (status, body) = post_json(
            app_with(true, true).await,
            "/upscale",
            json!({ "image": sample_payload(2, 2), "scale": 8 }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], 400);
    }

    #[tokio::test]
    async fn test_missing_image_field_is_400() {
        let (status, body) = post_json(app_with(true, true).await, "/enhance", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], 400);
    }

    #[test]
    fn test_registry_type_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CapabilityRegistry>();
        assert_send_sync::<Pipeline>();
    }
}
