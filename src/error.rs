// Error types for the emotion photo booth

use thiserror::Error;

/// Main error type for the photo booth
#[derive(Debug, Error)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid sequence policy: {0}")]
    InvalidPolicy(String),

    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Composition refused: {available} shots available, {required} required")]
    CompositionRefused { available: usize, required: usize },

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Camera initialization failed: {0}")]
    CameraInit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Sample script parse error: {0}")]
    ScriptParse(#[from] serde_json::Error),
}

/// Result type alias for photo booth operations
pub type Result<T> = std::result::Result<T, BoothError>;

// Conversion from nokhwa errors
#[cfg(feature = "camera")]
impl From<nokhwa::NokhwaError> for BoothError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                BoothError::CameraInit(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::ReadFrameError(error) => BoothError::CaptureUnavailable(error),
            _ => BoothError::CameraInit(err.to_string()),
        }
    }
}
