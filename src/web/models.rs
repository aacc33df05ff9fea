// API-specific data models for the web server

use super::error::ApiError;
use crate::models::{EnhancementRequest, EnhancementResult};
use serde::{Deserialize, Serialize};

fn default_scale() -> u32 {
    EnhancementRequest::DEFAULT_SCALE
}

fn default_denoise_strength() -> f32 {
    EnhancementRequest::DEFAULT_DENOISE_STRENGTH
}

/// JSON body accepted by all enhancement endpoints
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnhanceRequestBody {
    pub image: String,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub enhance_face: bool,
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: f32,
}

impl TryFrom<EnhanceRequestBody> for EnhancementRequest {
    type Error = ApiError;

    fn try_from(body: EnhanceRequestBody) -> Result<Self, Self::Error> {
        if !(1..=4).contains(&body.scale) {
            return Err(ApiError::BadRequest(format!(
                "scale must be between 1 and 4, got {}",
                body.scale
            )));
        }
        if !(0.0..=1.0).contains(&body.denoise_strength) {
            return Err(ApiError::BadRequest(format!(
                "denoise_strength must be between 0 and 1, got {}",
                body.denoise_strength
            )));
        }

        Ok(EnhancementRequest {
            image: body.image,
            scale: body.scale,
            enhance_face: body.enhance_face,
            denoise_strength: body.denoise_strength,
        })
    }
}

/// Successful response of all enhancement endpoints
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnhanceResponse {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub message: String,
}

impl From<EnhancementResult> for EnhanceResponse {
    fn from(result: EnhancementResult) -> Self {
        EnhanceResponse {
            image: result.image,
            width: result.width,
            height: result.height,
            message: result.message,
        }
    }
}

/// Response of `GET /`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub super_resolution_available: bool,
    pub face_restoration_available: bool,
}

/// Response of `GET /health`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> EnhanceRequestBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let request = EnhancementRequest::try_from(parse(r#"{"image":"abc"}"#)).unwrap();
        assert_eq!(request, EnhancementRequest::new("abc"));
    }

    #[test]
    fn test_scale_out_of_range_is_rejected() {
        for scale in [0, 5, 16] {
            let body = parse(&format!(r#"{{"image":"abc","scale":{}}}"#, scale));
            assert!(matches!(
                EnhancementRequest::try_from(body),
                Err(ApiError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_denoise_strength_out_of_range_is_rejected() {
        let body = parse(r#"{"image":"abc","denoise_strength":1.5}"#);
        assert!(matches!(
            EnhancementRequest::try_from(body),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_explicit_values() {
        let body = parse(r#"{"image":"abc","scale":4,"enhance_face":true,"denoise_strength":0.0}"#);
        let request = EnhancementRequest::try_from(body).unwrap();
        assert_eq!(request.scale, 4);
        assert!(request.enhance_face);
        assert_eq!(request.denoise_strength, 0.0);
    }
}
