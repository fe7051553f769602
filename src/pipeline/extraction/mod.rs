pub mod types;
pub mod confidence;
pub mod quality;
pub mod preprocess;
pub mod ocr;
pub mod reading_order;
pub mod coordinator;

pub use types::*;
pub use confidence::*;
pub use quality::*;
pub use preprocess::*;
pub use ocr::*;
pub use reading_order::*;
pub use coordinator::*;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid image: {0}")]
    InvalidImageFormat(String),

    #[error("Image quality too low for text recognition (score {score:.2})")]
    ImageQualityTooLow { score: f32 },

    #[error("No text found in image")]
    NoTextFound,

    #[error("Text recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("Another extraction is already running")]
    ServiceBusy,

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Text recognition engine error: {0}")]
    Engine(#[from] RecognitionError),

    #[error("Image preprocessing failed: {0}")]
    Preprocessing(String),
}

impl ExtractionError {
    /// Whether the caller can reasonably try again (possibly with a new photo).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidImageFormat(_))
    }

    /// Whether repeating the same request unchanged may succeed.
    pub fn is_retry_safe(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ServiceBusy | Self::Engine(_))
    }
}
