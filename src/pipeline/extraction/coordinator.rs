//! OCR coordinator: quality gate → preprocessing → recognition → metrics.
//!
//! One extraction at a time per coordinator. A second call while busy fails
//! with `ServiceBusy`. Recognition runs on its own task and races a hard
//! deadline; whichever finishes first wins and the other is dropped, which
//! aborts the engine task. `cancel()` resolves the in-flight call with
//! `Cancelled` immediately, mid-recognition included.
//!
//! The busy gate, the cancel slot and the progress channel belong to the
//! coordinator. Anything driving its stages (the orchestrator included) goes
//! through a [`Session`], so there is a single gate per engine.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{oneshot, watch};
use tokio_util::task::AbortOnDropHandle;

use super::confidence::ConfidenceDistribution;
use super::ocr::{RecognitionError, RecognitionRequest, TextRecognizer};
use super::preprocess::{ImagePreprocessor, LabelPreprocessor};
use super::quality::{ImageQualityAssessor, QualityAssessment};
use super::types::{CapturedImage, ExtractionResult, OcrMetrics, StageTimings, TextFragment};
use super::ExtractionError;
use crate::operation_gate::{ActiveOperation, OperationGate, OperationGuard, OperationKind};
use crate::pipeline_config::OcrConfig;

// Progress checkpoints
const PROGRESS_VALIDATED: f32 = 0.05;
const PROGRESS_QUALITY: f32 = 0.20;
const PROGRESS_PREPROCESSED: f32 = 0.35;
const PROGRESS_RECOGNIZED: f32 = 0.90;
pub(crate) const PROGRESS_DONE: f32 = 1.0;

pub struct OcrCoordinator {
    config: OcrConfig,
    recognizer: Arc<dyn TextRecognizer>,
    preprocessor: Arc<dyn ImagePreprocessor>,
    assessor: Arc<ImageQualityAssessor>,
    gate: OperationGate,
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
    progress: watch::Sender<f32>,
}

impl OcrCoordinator {
    pub fn new(config: OcrConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let (progress, _) = watch::channel(0.0);
        Self {
            config,
            recognizer,
            preprocessor: Arc::new(LabelPreprocessor::new()),
            assessor: Arc::new(ImageQualityAssessor::new()),
            gate: OperationGate::new(),
            cancel_tx: Mutex::new(None),
            progress,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn ImagePreprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_assessor(mut self, assessor: ImageQualityAssessor) -> Self {
        self.assessor = Arc::new(assessor);
        self
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Progress in [0, 1] of the current (or last) extraction.
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.gate.current_operation()
    }

    /// Cancel the in-flight extraction. Returns `false` when idle.
    ///
    /// The cancel slot is filled under the same lock that takes the gate, so
    /// whenever the coordinator is busy there is a sender to fire.
    pub fn cancel(&self) -> bool {
        let sender = self.cancel_slot().take();
        match sender {
            Some(tx) => {
                tracing::warn!("Text extraction cancel requested");
                tx.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Score an image without running recognition.
    pub fn assess_quality(&self, image: &CapturedImage) -> QualityAssessment {
        self.assessor.assess(image)
    }

    /// Run the full coordinator sequence on one image.
    pub async fn extract(&self, image: &CapturedImage) -> Result<ExtractionResult, ExtractionError> {
        let mut session = self.begin(OperationKind::TextExtraction)?;
        let outcome = session.run(self.run_stages(image)).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    fragments = result.metrics.fragment_count,
                    avg_confidence = result.metrics.average_confidence,
                    total_ms = result.metrics.timings.total.as_millis() as u64,
                    "Text extraction complete"
                );
            }
            Err(e) => tracing::warn!(error = %e, "Text extraction failed"),
        }
        outcome
    }

    // ── Stages ──────────────────────────────────────────────

    async fn run_stages(&self, image: &CapturedImage) -> Result<ExtractionResult, ExtractionError> {
        let total_start = Instant::now();
        self.validate(image)?;

        let quality_start = Instant::now();
        let quality = self.quality_gate(image)?;
        let quality_check = quality_start.elapsed();

        let preprocess_start = Instant::now();
        let (prepared, preprocessed) = self.prepare_image(image).await;
        let preprocessing = preprocess_start.elapsed();

        let recognition_start = Instant::now();
        let fragments = self.recognize_text(&prepared).await?;
        let recognition = recognition_start.elapsed();

        let distribution = ConfidenceDistribution::from_fragments(&fragments);
        let metrics = OcrMetrics {
            timings: StageTimings {
                quality_check,
                preprocessing,
                recognition,
                total: total_start.elapsed(),
            },
            quality_checks: quality
                .as_ref()
                .map(|q| q.checks.clone())
                .unwrap_or_default(),
            average_confidence: distribution.mean,
            fragment_count: fragments.len(),
            confidence: distribution,
            preprocessed,
        };
        self.set_progress(PROGRESS_DONE);

        Ok(ExtractionResult {
            fragments,
            quality,
            metrics,
        })
    }

    /// Reject images with a zero-length side.
    pub(crate) fn validate(&self, image: &CapturedImage) -> Result<(), ExtractionError> {
        if image.is_degenerate() {
            let (w, h) = image.dimensions();
            return Err(ExtractionError::InvalidImageFormat(format!(
                "image has a zero dimension ({w}x{h})"
            )));
        }
        self.set_progress(PROGRESS_VALIDATED);
        Ok(())
    }

    /// Hard gate: no recognition on images predicted to fail.
    /// `Ok(None)` when quality analysis is disabled.
    pub(crate) fn quality_gate(
        &self,
        image: &CapturedImage,
    ) -> Result<Option<QualityAssessment>, ExtractionError> {
        if !self.config.enable_quality_analysis {
            self.set_progress(PROGRESS_QUALITY);
            return Ok(None);
        }

        let assessment = self.assessor.assess(image);
        if !assessment.meets(self.config.minimum_quality_score) {
            tracing::info!(
                score = assessment.overall_score,
                minimum = self.config.minimum_quality_score,
                "Image rejected by quality gate"
            );
            return Err(ExtractionError::ImageQualityTooLow {
                score: assessment.overall_score,
            });
        }

        tracing::debug!(
            score = assessment.overall_score,
            recommendation = ?assessment.recommendation,
            "Image passed quality gate"
        );
        self.set_progress(PROGRESS_QUALITY);
        Ok(Some(assessment))
    }

    /// Best-effort enhancement on the blocking pool. Any failure falls back
    /// to the original image. Returns whether the enhanced image is used.
    pub(crate) async fn prepare_image(&self, image: &CapturedImage) -> (CapturedImage, bool) {
        let prepared = self.enhance(image).await;
        self.set_progress(PROGRESS_PREPROCESSED);
        prepared
    }

    async fn enhance(&self, image: &CapturedImage) -> (CapturedImage, bool) {
        if !self.config.enable_preprocessing {
            return (image.clone(), false);
        }

        let preprocessor = Arc::clone(&self.preprocessor);
        let input = image.clone();
        match tokio::task::spawn_blocking(move || preprocessor.preprocess(&input)).await {
            Ok(Ok(prepared)) => (prepared, true),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Preprocessing failed, using original image");
                (image.clone(), false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Preprocessing task failed, using original image");
                (image.clone(), false)
            }
        }
    }

    /// Run the engine on its own task, raced against `max_processing_time`.
    /// Dropping the handle (deadline hit or caller cancelled) aborts the task.
    pub(crate) async fn recognize_text(
        &self,
        image: &CapturedImage,
    ) -> Result<Vec<TextFragment>, ExtractionError> {
        let recognizer = Arc::clone(&self.recognizer);
        let request = RecognitionRequest::from(&self.config);
        let pixels = Arc::clone(&image.image);
        let engine = recognizer.name().to_string();

        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            recognizer.recognize(pixels, &request).await
        }));
        let deadline = self.config.max_processing_time();

        let raw = tokio::select! {
            joined = task => match joined {
                Ok(result) => result?,
                Err(e) => {
                    return Err(RecognitionError::Failed(format!("recognition task failed: {e}")).into());
                }
            },
            _ = tokio::time::sleep(deadline) => {
                tracing::warn!(engine = %engine, deadline_ms = deadline.as_millis() as u64, "Text recognition timed out");
                return Err(ExtractionError::Timeout(deadline));
            }
        };

        let received = raw.len();
        let fragments: Vec<TextFragment> = raw
            .into_iter()
            .filter(|f| f.confidence >= self.config.min_fragment_confidence)
            .filter(|f| !f.text.trim().is_empty())
            .collect();

        tracing::debug!(
            engine = %engine,
            received,
            kept = fragments.len(),
            "Recognition returned"
        );

        if fragments.is_empty() {
            return Err(ExtractionError::NoTextFound);
        }
        self.set_progress(PROGRESS_RECOGNIZED);
        Ok(fragments)
    }

    // ── Sessions ────────────────────────────────────────────

    /// Take the gate and arm the cancel slot in one critical section.
    /// Progress restarts at 0.
    pub(crate) fn begin(&self, kind: OperationKind) -> Result<Session<'_>, ExtractionError> {
        let mut slot = self.cancel_slot();
        let guard = self
            .gate
            .try_acquire(kind)
            .ok_or(ExtractionError::ServiceBusy)?;
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        drop(slot);

        self.set_progress(0.0);
        Ok(Session {
            coordinator: self,
            guard: Some(guard),
            cancel_rx: Some(rx),
        })
    }

    pub(crate) fn set_progress(&self, value: f32) {
        self.progress.send_replace(value);
    }

    fn cancel_slot(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.cancel_tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════
// Session: one gated, cancellable operation
// ═══════════════════════════════════════════════════════════

/// Holds the coordinator's gate for one operation. Dropping it disarms the
/// cancel slot and releases the gate under the slot lock.
pub(crate) struct Session<'a> {
    coordinator: &'a OcrCoordinator,
    guard: Option<OperationGuard<'a>>,
    cancel_rx: Option<oneshot::Receiver<()>>,
}

impl Session<'_> {
    /// Race `work` against `cancel()`. Losing the race drops `work`, which
    /// aborts any engine task it owns. Any failure resets progress to 0.
    pub(crate) async fn run<T>(
        &mut self,
        work: impl Future<Output = Result<T, ExtractionError>>,
    ) -> Result<T, ExtractionError> {
        let outcome = match self.cancel_rx.take() {
            Some(cancel_rx) => tokio::select! {
                biased;
                _ = cancel_rx => Err(ExtractionError::Cancelled),
                result = work => result,
            },
            None => work.await,
        };
        if outcome.is_err() {
            self.coordinator.set_progress(0.0);
        }
        outcome
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let mut slot = self.coordinator.cancel_slot();
        slot.take();
        self.guard.take();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
