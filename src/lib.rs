//! Label and scale-display text interpretation.
//!
//! Turns the unordered output of a text-recognition engine (fragments with
//! confidence and normalized bounding boxes) into typed nutrition facts and
//! weight readings:
//!
//! quality gate → preprocessing → recognition (deadline race) → parsing →
//! recommendations.
//!
//! The recognition engine itself is injected through
//! [`pipeline::extraction::TextRecognizer`].

pub mod config;
pub mod operation_gate;
pub mod pipeline;
pub mod pipeline_config;

pub use operation_gate::{ActiveOperation, OperationGate, OperationGuard, OperationKind};
pub use pipeline::extraction::{
    BoundingBox, CapturedImage, ExtractionError, OcrCoordinator, QualityAssessment,
    RecognitionError, RecognitionRequest, TextFragment, TextRecognizer,
};
pub use pipeline::nutrition::{NutritionParser, ParsedNutritionData};
pub use pipeline::orchestrator::{
    ExtractionMetrics, ExtractionOrchestrator, ExtractionOutcome, NutritionExtraction, PipelineState,
};
pub use pipeline::recommendation::{Recommendation, RecommendationKind, RecommendationPriority};
pub use pipeline::weight::{DetectedWeight, WeightDetectionResult, WeightDetector, WeightUnit};
pub use pipeline_config::{OcrConfig, ParserConfig, PipelineConfig, WeightConfig};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber honoring `RUST_LOG`.
///
/// Falls back to [`config::default_log_filter`]. Safe to call more than once:
/// later calls leave the first subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
    }
}
