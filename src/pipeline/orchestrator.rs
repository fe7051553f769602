//! Extraction orchestrator: quality → OCR → parse → recommend.
//!
//! Drives the coordinator stages itself so every stage boundary is visible on
//! the [`PipelineState`] channel. Stages run strictly in order, never in
//! parallel. Runs hold the coordinator's own gate, so the orchestrator and
//! direct `coordinator().extract()` calls never overlap on one engine.
//! `cancel()` resolves the in-flight call with `Cancelled` and aborts the
//! engine task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use super::extraction::coordinator::PROGRESS_DONE;
use super::extraction::{
    CapturedImage, ConfidenceDistribution, ExtractionError, OcrCoordinator, QualityAssessment,
    TextFragment, TextRecognizer,
};
use super::nutrition::{NutritionParser, ParsedNutritionData};
use super::recommendation::{
    recommend, Recommendation, RecommendationSignals, NUTRITION_CONFIDENCE_THRESHOLD,
};
use super::weight::{WeightDetectionResult, WeightDetector};
use crate::operation_gate::{ActiveOperation, OperationKind};
use crate::pipeline_config::PipelineConfig;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    QualityCheck,
    Ocr,
    Parsing,
    Recommending,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    pub quality_check_time: Duration,
    pub preprocessing_time: Duration,
    pub ocr_time: Duration,
    pub parsing_time: Duration,
    pub recommendation_time: Duration,
    pub total_time: Duration,
    /// `None` when quality analysis is disabled.
    pub image_quality_score: Option<f32>,
    pub ocr_average_confidence: f32,
    pub fragment_count: usize,
    /// Proxy for parse accuracy: the nutrition overall confidence.
    pub parsed_accuracy: f32,
}

/// A completed nutrition extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionExtraction {
    pub extraction_id: Uuid,
    pub data: ParsedNutritionData,
    pub quality: Option<QualityAssessment>,
    pub metrics: ExtractionMetrics,
    pub recommendations: Vec<Recommendation>,
    pub completed_at: DateTime<Utc>,
}

/// What the caller should do with an extraction attempt.
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Calories or macros found with confidence at or above 0.6.
    Success(NutritionExtraction),
    /// Basic nutrition found, but the caller should ask for confirmation.
    LowConfidence(NutritionExtraction),
    /// Nothing usable recognized; fall back to manual entry.
    ManualFallback {
        reason: String,
        partial: Option<ParsedNutritionData>,
    },
    Failed(ExtractionError),
    Cancelled,
}

impl ExtractionOutcome {
    pub fn from_result(result: Result<NutritionExtraction, ExtractionError>) -> Self {
        match result {
            Ok(extraction) => {
                let data = &extraction.data;
                if data.has_basic_nutrition() {
                    if extraction.metrics.parsed_accuracy >= NUTRITION_CONFIDENCE_THRESHOLD {
                        Self::Success(extraction)
                    } else {
                        Self::LowConfidence(extraction)
                    }
                } else if data.has_any_data() {
                    Self::ManualFallback {
                        reason: "No calories or macronutrients recognized".to_string(),
                        partial: Some(extraction.data),
                    }
                } else {
                    Self::ManualFallback {
                        reason: "No nutrition facts recognized".to_string(),
                        partial: None,
                    }
                }
            }
            Err(ExtractionError::Cancelled) => Self::Cancelled,
            Err(e @ ExtractionError::NoTextFound) => Self::ManualFallback {
                reason: e.to_string(),
                partial: None,
            },
            Err(e) => Self::Failed(e),
        }
    }

    pub fn extraction(&self) -> Option<&NutritionExtraction> {
        match self {
            Self::Success(e) | Self::LowConfidence(e) => Some(e),
            _ => None,
        }
    }
}

/// Output of the shared quality → OCR stages.
struct RecognizedText {
    fragments: Vec<TextFragment>,
    quality: Option<QualityAssessment>,
    quality_check_time: Duration,
    preprocessing_time: Duration,
    ocr_time: Duration,
}

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

pub struct ExtractionOrchestrator {
    coordinator: OcrCoordinator,
    parser: NutritionParser,
    weight_detector: WeightDetector,
    state: watch::Sender<PipelineState>,
}

impl ExtractionOrchestrator {
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self::from_parts(
            OcrCoordinator::new(config.ocr, recognizer),
            NutritionParser::new(config.parser),
            WeightDetector::new(config.weight),
        )
    }

    /// Assemble from pre-built stages (custom assessor or preprocessor).
    pub fn from_parts(
        coordinator: OcrCoordinator,
        parser: NutritionParser,
        weight_detector: WeightDetector,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            coordinator,
            parser,
            weight_detector,
            state,
        }
    }

    pub fn coordinator(&self) -> &OcrCoordinator {
        &self.coordinator
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Progress in [0, 1] of the current (or last) operation.
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.coordinator.subscribe_progress()
    }

    pub fn progress(&self) -> f32 {
        self.coordinator.progress()
    }

    pub fn is_busy(&self) -> bool {
        self.coordinator.is_busy()
    }

    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.coordinator.current_operation()
    }

    /// Cancel the in-flight operation. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    /// Score an image without recognizing it. Does not take the busy gate.
    pub fn assess_quality(&self, image: &CapturedImage) -> QualityAssessment {
        self.coordinator.assess_quality(image)
    }

    /// Photo of a nutrition label → parsed facts, metrics, recommendations.
    pub async fn extract_nutrition(
        &self,
        image: &CapturedImage,
    ) -> Result<NutritionExtraction, ExtractionError> {
        let mut session = self.coordinator.begin(OperationKind::NutritionExtraction)?;
        let result = session.run(self.nutrition_stages(image)).await;
        self.finish(result.as_ref().err());

        match &result {
            Ok(extraction) => tracing::info!(
                extraction_id = %extraction.extraction_id,
                nutrients = extraction.data.resolved_count(),
                accuracy = extraction.metrics.parsed_accuracy,
                recommendations = extraction.recommendations.len(),
                total_ms = extraction.metrics.total_time.as_millis() as u64,
                "Nutrition extraction complete"
            ),
            Err(e) => tracing::warn!(error = %e, "Nutrition extraction failed"),
        }
        result
    }

    /// Photo of a scale display or package → weight candidates.
    pub async fn detect_weight(
        &self,
        image: &CapturedImage,
    ) -> Result<WeightDetectionResult, ExtractionError> {
        let mut session = self.coordinator.begin(OperationKind::WeightDetection)?;
        let result = session.run(self.weight_stages(image)).await;
        self.finish(result.as_ref().err());

        match &result {
            Ok(detection) => tracing::info!(
                candidates = detection.detected_weights.len(),
                valid = detection.has_valid_weight(),
                confidence = detection.confidence,
                "Weight detection complete"
            ),
            Err(e) => tracing::warn!(error = %e, "Weight detection failed"),
        }
        result
    }

    /// [`Self::extract_nutrition`] folded into an [`ExtractionOutcome`].
    pub async fn run(&self, image: &CapturedImage) -> ExtractionOutcome {
        ExtractionOutcome::from_result(self.extract_nutrition(image).await)
    }

    // ── Stages ──────────────────────────────────────────────

    async fn nutrition_stages(
        &self,
        image: &CapturedImage,
    ) -> Result<NutritionExtraction, ExtractionError> {
        let total_start = Instant::now();
        let recognized = self.recognize(image).await?;

        self.set_state(PipelineState::Parsing);
        let parse_start = Instant::now();
        let data = self.parser.parse(&recognized.fragments);
        let parsing_time = parse_start.elapsed();

        self.set_state(PipelineState::Recommending);
        let recommend_start = Instant::now();
        let distribution = ConfidenceDistribution::from_fragments(&recognized.fragments);
        let image_quality_score = recognized.quality.as_ref().map(|q| q.overall_score);
        let recommendations = recommend(&RecommendationSignals {
            image_quality: image_quality_score,
            ocr_average_confidence: distribution.mean,
            nutrition_confidence: data.confidence.overall_score,
            has_data: data.has_any_data(),
        });
        let recommendation_time = recommend_start.elapsed();

        let metrics = ExtractionMetrics {
            quality_check_time: recognized.quality_check_time,
            preprocessing_time: recognized.preprocessing_time,
            ocr_time: recognized.ocr_time,
            parsing_time,
            recommendation_time,
            total_time: total_start.elapsed(),
            image_quality_score,
            ocr_average_confidence: distribution.mean,
            fragment_count: recognized.fragments.len(),
            parsed_accuracy: data.confidence.overall_score,
        };

        self.coordinator.set_progress(PROGRESS_DONE);
        Ok(NutritionExtraction {
            extraction_id: Uuid::new_v4(),
            data,
            quality: recognized.quality,
            metrics,
            recommendations,
            completed_at: Utc::now(),
        })
    }

    async fn weight_stages(
        &self,
        image: &CapturedImage,
    ) -> Result<WeightDetectionResult, ExtractionError> {
        let recognized = self.recognize(image).await?;
        self.set_state(PipelineState::Parsing);
        let detection = self.weight_detector.detect(&recognized.fragments);
        self.coordinator.set_progress(PROGRESS_DONE);
        Ok(detection)
    }

    /// Validate, quality gate, preprocess, recognize.
    async fn recognize(&self, image: &CapturedImage) -> Result<RecognizedText, ExtractionError> {
        self.set_state(PipelineState::QualityCheck);
        self.coordinator.validate(image)?;
        let quality_start = Instant::now();
        let quality = self.coordinator.quality_gate(image)?;
        let quality_check_time = quality_start.elapsed();

        self.set_state(PipelineState::Ocr);
        let preprocess_start = Instant::now();
        let (prepared, _) = self.coordinator.prepare_image(image).await;
        let preprocessing_time = preprocess_start.elapsed();

        let ocr_start = Instant::now();
        let fragments = self.coordinator.recognize_text(&prepared).await?;
        let ocr_time = ocr_start.elapsed();

        Ok(RecognizedText {
            fragments,
            quality,
            quality_check_time,
            preprocessing_time,
            ocr_time,
        })
    }

    // ── Internal ────────────────────────────────────────────

    fn finish(&self, error: Option<&ExtractionError>) {
        let state = match error {
            None => PipelineState::Completed,
            Some(ExtractionError::Cancelled) => PipelineState::Idle,
            Some(_) => PipelineState::Error,
        };
        self.set_state(state);
    }

    fn set_state(&self, state: PipelineState) {
        self.state.send_replace(state);
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GrayImage, Luma};

    use super::*;
    use crate::pipeline::extraction::{
        BoundingBox, FixedQualityProbe, ImageQualityAssessor, MockImagePreprocessor,
        MockTextRecognizer, QualityCheckType,
    };
    use crate::pipeline::recommendation::{RecommendationKind, RecommendationPriority};
    use crate::pipeline_config::OcrConfig;

    fn label_image() -> CapturedImage {
        CapturedImage::new(DynamicImage::ImageLuma8(GrayImage::from_fn(64, 48, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 { Luma([0]) } else { Luma([255]) }
        })))
    }

    fn row(text: &str, confidence: f32, y: f32) -> TextFragment {
        TextFragment::new(text, confidence, BoundingBox::new(0.1, y, 0.5, 0.05))
    }

    fn label_fragments() -> Vec<TextFragment> {
        vec![
            row("Calories 250", 0.95, 0.10),
            row("Protein 12g", 0.90, 0.20),
            row("Total Fat 5g", 0.85, 0.30),
        ]
    }

    fn bare_config() -> PipelineConfig {
        PipelineConfig {
            ocr: OcrConfig {
                enable_quality_analysis: false,
                enable_preprocessing: false,
                ..OcrConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn orchestrator(recognizer: MockTextRecognizer) -> (ExtractionOrchestrator, Arc<MockTextRecognizer>) {
        let mock = Arc::new(recognizer);
        (ExtractionOrchestrator::new(bare_config(), mock.clone()), mock)
    }

    /// Quality analysis on, with a fixed score instead of pixel analysis.
    fn gated_orchestrator(score: f32, minimum: f32, fragments: Vec<TextFragment>) -> ExtractionOrchestrator {
        let config = OcrConfig {
            minimum_quality_score: minimum,
            ..OcrConfig::default()
        };
        let coordinator = OcrCoordinator::new(config, Arc::new(MockTextRecognizer::new(fragments)))
            .with_preprocessor(Arc::new(MockImagePreprocessor::new()))
            .with_assessor(ImageQualityAssessor::with_probes(vec![Box::new(
                FixedQualityProbe::new(QualityCheckType::Resolution, score),
            )]));
        ExtractionOrchestrator::from_parts(coordinator, NutritionParser::default(), WeightDetector::default())
    }

    #[tokio::test]
    async fn label_extraction_end_to_end() {
        let (orch, mock) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let extraction = orch.extract_nutrition(&label_image()).await.unwrap();

        let data = &extraction.data;
        assert_eq!(data.calories.as_ref().unwrap().value, 250.0);
        assert_eq!(data.macronutrients.protein.as_ref().unwrap().unit, "g");
        assert_eq!(data.macronutrients.fat.as_ref().unwrap().value, 5.0);
        assert!(data.has_basic_nutrition());

        assert_eq!(extraction.metrics.fragment_count, 3);
        assert!((extraction.metrics.ocr_average_confidence - 0.9).abs() < 1e-5);
        assert_eq!(extraction.metrics.parsed_accuracy, data.confidence.overall_score);
        assert!(extraction.metrics.parsed_accuracy > 0.7);
        assert!(extraction.metrics.image_quality_score.is_none());
        assert!(extraction.recommendations.is_empty());

        assert_eq!(orch.state(), PipelineState::Completed);
        assert!(!orch.is_busy());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn run_classifies_success() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let outcome = orch.run(&label_image()).await;
        assert!(matches!(outcome, ExtractionOutcome::Success(_)));
        assert!(outcome.extraction().is_some());
    }

    #[tokio::test]
    async fn weak_parse_is_low_confidence_with_reframe() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(vec![row("Carbs 30", 0.9, 0.1)]));
        let extraction = match orch.run(&label_image()).await {
            ExtractionOutcome::LowConfidence(extraction) => extraction,
            other => panic!("expected low confidence, got {other:?}"),
        };
        assert!(extraction.metrics.parsed_accuracy < 0.6);
        assert_eq!(extraction.recommendations.len(), 1);
        assert_eq!(extraction.recommendations[0].kind, RecommendationKind::Reframe);
    }

    #[tokio::test]
    async fn micronutrients_only_falls_back_with_partial() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(vec![row("Sodium 140mg", 0.9, 0.1)]));
        match orch.run(&label_image()).await {
            ExtractionOutcome::ManualFallback { partial: Some(data), .. } => {
                assert_eq!(data.micronutrients.sodium.unwrap().value, 140.0);
            }
            other => panic!("expected manual fallback with partial data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrelated_text_recommends_manual_entry() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(vec![row("Ingredients: water", 0.9, 0.1)]));
        let extraction = orch.extract_nutrition(&label_image()).await.unwrap();
        let kinds: Vec<_> = extraction
            .recommendations
            .iter()
            .map(|r| (r.kind, r.priority))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (RecommendationKind::RetakePhoto, RecommendationPriority::High),
                (RecommendationKind::ManualEntry, RecommendationPriority::High),
            ]
        );

        let (orch, _) = orchestrator(MockTextRecognizer::new(vec![row("Ingredients: water", 0.9, 0.1)]));
        assert!(matches!(
            orch.run(&label_image()).await,
            ExtractionOutcome::ManualFallback { partial: None, .. }
        ));
    }

    #[tokio::test]
    async fn low_ocr_confidence_suggests_lighting() {
        let fragments = vec![
            row("Calories 250", 0.6, 0.10),
            row("Protein 12g", 0.6, 0.20),
        ];
        let (orch, _) = orchestrator(MockTextRecognizer::new(fragments));
        let extraction = orch.extract_nutrition(&label_image()).await.unwrap();
        assert!(extraction
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::ImproveLighting
                && r.priority == RecommendationPriority::Medium));
    }

    #[tokio::test]
    async fn passing_but_poor_quality_recommends_retake() {
        let orch = gated_orchestrator(0.5, 0.4, label_fragments());
        let extraction = orch.extract_nutrition(&label_image()).await.unwrap();
        assert_eq!(extraction.metrics.image_quality_score, Some(0.5));
        assert!(extraction.quality.is_some());
        assert_eq!(extraction.recommendations[0].kind, RecommendationKind::RetakePhoto);
    }

    #[tokio::test]
    async fn quality_gate_failure_is_reported() {
        let orch = gated_orchestrator(0.3, 0.6, label_fragments());
        let err = orch.extract_nutrition(&label_image()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ImageQualityTooLow { .. }));
        assert_eq!(orch.state(), PipelineState::Error);

        let orch = gated_orchestrator(0.3, 0.6, label_fragments());
        assert!(matches!(
            orch.run(&label_image()).await,
            ExtractionOutcome::Failed(ExtractionError::ImageQualityTooLow { .. })
        ));
    }

    #[tokio::test]
    async fn no_text_falls_back_to_manual_entry() {
        let (orch, _) = orchestrator(MockTextRecognizer::empty());
        match orch.run(&label_image()).await {
            ExtractionOutcome::ManualFallback { reason, partial } => {
                assert!(!reason.is_empty());
                assert!(partial.is_none());
            }
            other => panic!("expected manual fallback, got {other:?}"),
        }
        assert_eq!(orch.state(), PipelineState::Error);
    }

    #[tokio::test]
    async fn weight_from_scale_display() {
        let fragments = vec![
            TextFragment::new("M", 0.8, BoundingBox::centered(0.2, 0.5, 0.1, 0.05)),
            TextFragment::new("354", 0.8, BoundingBox::centered(0.5, 0.5, 0.1, 0.05)),
            TextFragment::new("PCS", 0.8, BoundingBox::centered(0.8, 0.5, 0.1, 0.05)),
        ];
        let (orch, _) = orchestrator(MockTextRecognizer::new(fragments));
        let result = orch.detect_weight(&label_image()).await.unwrap();
        assert_eq!(result.best_weight().unwrap().value, 35.4);
        assert!(result.has_valid_weight());
        assert_eq!(orch.state(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn assess_quality_skips_recognition() {
        let orch = gated_orchestrator(0.8, 0.6, label_fragments());
        let assessment = orch.assess_quality(&label_image());
        assert!((assessment.overall_score - 0.8).abs() < 1e-6);
        assert_eq!(orch.state(), PipelineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_operation_while_busy_is_rejected() {
        let (orch, mock) = orchestrator(
            MockTextRecognizer::new(label_fragments()).with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orch);

        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.extract_nutrition(&label_image()).await })
        };
        while !orch.is_busy() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            orch.current_operation().unwrap().kind,
            OperationKind::NutritionExtraction
        );

        let err = orch.extract_nutrition(&label_image()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ServiceBusy));
        let err = orch.detect_weight(&label_image()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ServiceBusy));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(mock.call_count(), 1);
        assert!(!orch.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_recognition() {
        let (orch, mock) = orchestrator(
            MockTextRecognizer::new(label_fragments()).with_delay(Duration::from_secs(20)),
        );
        let orch = Arc::new(orch);

        let running = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.run(&label_image()).await })
        };
        while mock.call_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(orch.state(), PipelineState::Ocr);

        assert!(orch.cancel());
        let outcome = running.await.unwrap();
        assert!(matches!(outcome, ExtractionOutcome::Cancelled));
        assert_eq!(orch.state(), PipelineState::Idle);
        assert!(!orch.is_busy());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.completed_calls(), 0);
    }

    #[tokio::test]
    async fn progress_published_through_completion() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let mut progress = orch.subscribe_progress();
        assert_eq!(*progress.borrow_and_update(), 0.0);

        orch.extract_nutrition(&label_image()).await.unwrap();
        assert!(progress.has_changed().unwrap());
        assert_eq!(*progress.borrow_and_update(), 1.0);
        assert_eq!(orch.coordinator().progress(), 1.0);

        // Failures reset it
        let (orch, _) = orchestrator(MockTextRecognizer::empty());
        orch.detect_weight(&label_image()).await.unwrap_err();
        assert_eq!(orch.progress(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_midway_while_recognizing() {
        let (orch, mock) = orchestrator(
            MockTextRecognizer::new(label_fragments()).with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orch);
        let running = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.detect_weight(&label_image()).await })
        };
        while mock.call_count() == 0 {
            tokio::task::yield_now().await;
        }
        let midway = orch.progress();
        assert!(midway > 0.0 && midway < 1.0, "progress {midway}");

        running.await.unwrap().unwrap();
        assert_eq!(orch.progress(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_shares_the_busy_gate() {
        let (orch, mock) = orchestrator(
            MockTextRecognizer::new(label_fragments()).with_delay(Duration::from_secs(5)),
        );
        let orch = Arc::new(orch);
        let running = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.extract_nutrition(&label_image()).await })
        };
        while !orch.is_busy() {
            tokio::task::yield_now().await;
        }
        assert!(orch.coordinator().is_busy());

        let err = orch.coordinator().extract(&label_image()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ServiceBusy));

        assert!(running.await.unwrap().is_ok());
        assert_eq!(mock.call_count(), 1);
        assert!(orch.coordinator().extract(&label_image()).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_when_idle_is_noop() {
        let (orch, _) = orchestrator(MockTextRecognizer::empty());
        assert!(!orch.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_engine_times_out() {
        let mock = Arc::new(
            MockTextRecognizer::new(label_fragments()).with_delay(Duration::from_secs(60)),
        );
        let mut config = bare_config();
        config.ocr.max_processing_time_ms = 500;
        let orch = ExtractionOrchestrator::new(config, mock);

        let outcome = orch.run(&label_image()).await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::Failed(ExtractionError::Timeout(d)) if d == Duration::from_millis(500)
        ));
        assert_eq!(orch.state(), PipelineState::Error);
    }

    #[tokio::test]
    async fn independent_instances_run_concurrently() {
        let (a, _) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let (b, _) = orchestrator(MockTextRecognizer::new(vec![row("Sodium 140mg", 0.9, 0.1)]));
        let image = label_image();

        let (ra, rb) = tokio::join!(a.extract_nutrition(&image), b.extract_nutrition(&image));
        let (ra, rb) = (ra.unwrap(), rb.unwrap());
        assert!(ra.data.calories.is_some());
        assert!(rb.data.calories.is_none());
        assert_ne!(ra.extraction_id, rb.extraction_id);
    }

    #[tokio::test]
    async fn state_channel_reports_completion() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let mut states = orch.subscribe_state();
        assert_eq!(*states.borrow(), PipelineState::Idle);

        orch.extract_nutrition(&label_image()).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn extraction_serializes() {
        let (orch, _) = orchestrator(MockTextRecognizer::new(label_fragments()));
        let extraction = orch.extract_nutrition(&label_image()).await.unwrap();
        let json = serde_json::to_value(&extraction).unwrap();
        assert_eq!(json["extraction_id"], extraction.extraction_id.to_string());
        assert_eq!(json["data"]["calories"]["value"], 250.0);
        assert!(json["recommendations"].as_array().unwrap().is_empty());
    }
}
