//! Text recognition engine seam.
//!
//! The engine is an injected collaborator: given pixels, it returns fragments
//! with confidence and normalized position. The coordinator owns the deadline
//! and cancellation; `engine_timeout` is only a hint the engine may honor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::types::TextFragment;
use crate::pipeline_config::OcrConfig;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecognitionError {
    #[error("Recognition engine unavailable: {0}")]
    Unavailable(String),

    #[error("Recognition failed: {0}")]
    Failed(String),

    #[error("Engine timed out after {0:?}")]
    EngineTimeout(Duration),
}

/// Parameters forwarded to the engine with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionRequest {
    pub languages: Vec<String>,
    pub custom_vocabulary: Vec<String>,
    pub min_confidence: f32,
    pub engine_timeout: Duration,
}

impl From<&OcrConfig> for RecognitionRequest {
    fn from(config: &OcrConfig) -> Self {
        Self {
            languages: config.languages.clone(),
            custom_vocabulary: config.custom_vocabulary.clone(),
            min_confidence: config.min_fragment_confidence,
            engine_timeout: config.engine_timeout(),
        }
    }
}

impl Default for RecognitionRequest {
    fn default() -> Self {
        Self::from(&OcrConfig::default())
    }
}

/// Text recognition engine abstraction (allows mocking for tests)
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image: Arc<DynamicImage>,
        request: &RecognitionRequest,
    ) -> Result<Vec<TextFragment>, RecognitionError>;

    /// Engine name for logs.
    fn name(&self) -> &str;
}

// ═══════════════════════════════════════════════════════════
// Mock implementation (testing)
// ═══════════════════════════════════════════════════════════

/// Scripted recognizer: returns fixed fragments after an optional delay.
///
/// `completed_calls()` only counts calls that ran to the end, so an aborted
/// call (deadline or cancel) is observable from tests.
pub struct MockTextRecognizer {
    fragments: Vec<TextFragment>,
    delay: Option<Duration>,
    failure: Option<RecognitionError>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    last_request: Mutex<Option<RecognitionRequest>>,
}

impl MockTextRecognizer {
    pub fn new(fragments: Vec<TextFragment>) -> Self {
        Self {
            fragments,
            delay: None,
            failure: None,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Recognizer that finds nothing.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing(error: RecognitionError) -> Self {
        let mut mock = Self::empty();
        mock.failure = Some(error);
        mock
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        self.last_request.lock().ok()?.clone()
    }
}

#[async_trait]
impl TextRecognizer for MockTextRecognizer {
    async fn recognize(
        &self,
        _image: Arc<DynamicImage>,
        request: &RecognitionRequest,
    ) -> Result<Vec<TextFragment>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.fragments.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::BoundingBox;

    fn pixels() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_luma8(4, 4))
    }

    #[test]
    fn request_built_from_config() {
        let config = OcrConfig {
            languages: vec!["fr-FR".into(), "en-US".into()],
            min_fragment_confidence: 0.3,
            engine_timeout_ms: 1_500,
            ..OcrConfig::default()
        };
        let request = RecognitionRequest::from(&config);
        assert_eq!(request.languages, vec!["fr-FR", "en-US"]);
        assert!((request.min_confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(request.engine_timeout, Duration::from_millis(1_500));
        assert!(request.custom_vocabulary.iter().any(|w| w == "Calories"));
    }

    #[tokio::test]
    async fn mock_returns_scripted_fragments() {
        let frag = TextFragment::new("Protein 12g", 0.9, BoundingBox::new(0.1, 0.1, 0.3, 0.05));
        let mock = MockTextRecognizer::new(vec![frag.clone()]);

        let result = mock.recognize(pixels(), &RecognitionRequest::default()).await.unwrap();
        assert_eq!(result, vec![frag]);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.completed_calls(), 1);
        assert_eq!(mock.last_request(), Some(RecognitionRequest::default()));
    }

    #[tokio::test]
    async fn mock_failure_propagates() {
        let mock = MockTextRecognizer::failing(RecognitionError::Unavailable("offline".into()));
        let err = mock
            .recognize(pixels(), &RecognitionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable(_)));
        assert_eq!(mock.name(), "mock");
    }

    #[tokio::test(start_paused = true)]
    async fn mock_delay_uses_tokio_clock() {
        let mock = MockTextRecognizer::empty().with_delay(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        mock.recognize(pixels(), &RecognitionRequest::default()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
