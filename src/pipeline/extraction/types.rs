use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceDistribution;
use super::preprocess::read_exif_orientation;
use super::quality::{QualityAssessment, QualityCheck};
use super::reading_order::linearize;
use super::ExtractionError;

/// Bounding box of a recognized fragment, normalized to 0..1 with the origin
/// at the top-left corner of the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Box of the given size centered on `(cx, cy)`.
    pub fn centered(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn min_x(&self) -> f32 {
        self.x
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn mid_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn mid_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn center(&self) -> (f32, f32) {
        (self.mid_x(), self.mid_y())
    }

    /// Euclidean distance between the two box centers.
    pub fn distance_to(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        (ax - bx).hypot(ay - by)
    }
}

/// One recognized string with its engine confidence and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Engine confidence, clamped to [0, 1].
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bounding_box,
        }
    }
}

/// A photo handed to the pipeline.
///
/// Pixels are shared behind an `Arc` so stages and worker tasks can hold the
/// same image without copying it.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub image: Arc<DynamicImage>,
    /// EXIF orientation tag (1 = upright). Preprocessing normalizes it to 1.
    pub orientation: u32,
}

impl CapturedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            orientation: 1,
        }
    }

    pub fn with_orientation(mut self, orientation: u32) -> Self {
        self.orientation = orientation;
        self
    }

    /// Decode an encoded photo (JPEG, PNG, TIFF) and read its EXIF orientation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ExtractionError::InvalidImageFormat(e.to_string()))?;
        Ok(Self::new(image).with_orientation(read_exif_orientation(bytes)))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// True when either side is zero pixels.
    pub fn is_degenerate(&self) -> bool {
        let (w, h) = self.dimensions();
        w == 0 || h == 0
    }

    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

/// Wall-clock time spent in each coordinator stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub quality_check: Duration,
    pub preprocessing: Duration,
    pub recognition: Duration,
    pub total: Duration,
}

/// Metrics collected for one recognition pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrMetrics {
    pub timings: StageTimings,
    pub quality_checks: Vec<QualityCheck>,
    pub confidence: ConfidenceDistribution,
    /// Mean fragment confidence (same as `confidence.mean`).
    pub average_confidence: f32,
    pub fragment_count: usize,
    /// Whether the recognized image was the preprocessed one.
    pub preprocessed: bool,
}

/// Output of [`OcrCoordinator::extract`](super::OcrCoordinator::extract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub fragments: Vec<TextFragment>,
    /// `None` when quality analysis is disabled.
    pub quality: Option<QualityAssessment>,
    pub metrics: OcrMetrics,
}

impl ExtractionResult {
    /// Fragments joined in reading order.
    pub fn text(&self) -> String {
        linearize(&self.fragments)
    }

    pub fn average_confidence(&self) -> f32 {
        self.metrics.average_confidence
    }
}
