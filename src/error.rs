// src/error.rs
// Error types shared by the codec, the capability layer and the pipeline.
// HTTP mapping lives in web/error.rs.

use crate::capability::Capability;
use std::fmt;

/// Outcome kinds of a failed enhancement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    CapabilityUnavailable,
    Inference,
    Internal,
}

/// Error returned by every pipeline operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EnhanceError {
    // The payload was not valid base64 or not a decodable raster image.
    Decode(String),
    // The capability never loaded or failed to load at startup.
    CapabilityUnavailable(Capability),
    // The model collaborator failed while running. Never retried.
    Inference {
        capability: Capability,
        message: String,
    },
    // Anything that should not happen for well-formed buffers (e.g. PNG encoding).
    Internal(String),
}

impl EnhanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnhanceError::Decode(_) => ErrorKind::Decode,
            EnhanceError::CapabilityUnavailable(_) => ErrorKind::CapabilityUnavailable,
            EnhanceError::Inference { .. } => ErrorKind::Inference,
            EnhanceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for EnhanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnhanceError::Decode(msg) => write!(f, "Failed to decode image: {}", msg),
            EnhanceError::CapabilityUnavailable(capability) => {
                write!(f, "{} model not loaded", capability)
            }
            EnhanceError::Inference {
                capability,
                message,
            } => write!(f, "{} inference failed: {}", capability, message),
            EnhanceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for EnhanceError {}

/// Failure raised by a model collaborator during a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceError(pub String);

impl InferenceError {
    pub fn new(message: impl Into<String>) -> Self {
        InferenceError(message.into())
    }
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InferenceError {}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        InferenceError(err.to_string())
    }
}

/// Errors that can occur while acquiring a capability at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Weight file is not cached and no download URL is configured.
    MissingWeights { filename: String },
    /// Fetching the weight file failed.
    Download(String),
    /// Cached weight file does not match the configured BLAKE3 digest.
    ChecksumMismatch { expected: String, actual: String },
    /// Filesystem error in the weight cache.
    Io(String),
    /// ONNX Runtime could not build a session from the weights.
    Model(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::MissingWeights { filename } => write!(
                f,
                "Weight file '{}' is not cached and no download URL is configured",
                filename
            ),
            LoadError::Download(msg) => write!(f, "Download failed: {}", msg),
            LoadError::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
            }
            LoadError::Io(msg) => write!(f, "IO error: {}", msg),
            LoadError::Model(msg) => write!(f, "Model initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        LoadError::Download(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(EnhanceError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(
            EnhanceError::CapabilityUnavailable(Capability::SuperResolution).kind(),
            ErrorKind::CapabilityUnavailable
        );
        assert_eq!(
            EnhanceError::Inference {
                capability: Capability::FaceRestoration,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Inference
        );
    }

    #[test]
    fn test_display_preserves_collaborator_message() {
        let err = EnhanceError::Inference {
            capability: Capability::SuperResolution,
            message: "CUDA out of memory".into(),
        };
        assert!(err.to_string().contains("CUDA out of memory"));

        let err = EnhanceError::Decode("invalid byte".into());
        assert!(err.to_string().starts_with("Failed to decode image"));
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::MissingWeights {
            filename: "GFPGANv1.4.onnx".into(),
        };
        assert!(err.to_string().contains("GFPGANv1.4.onnx"));
    }
}
