//! Human-facing follow-ups derived from extraction confidence.
//!
//! Low-confidence successes are not errors. They come back with
//! recommendations so the caller can ask for a retake, a confirmation, or
//! manual entry. Rules are independent; several may fire at once.

use serde::{Deserialize, Serialize};

/// Image quality below this asks for a retake.
pub const IMAGE_QUALITY_THRESHOLD: f32 = 0.6;
/// Mean OCR confidence below this suggests better lighting.
pub const OCR_CONFIDENCE_THRESHOLD: f32 = 0.7;
/// Nutrition confidence below this asks for a reframe or retake.
pub const NUTRITION_CONFIDENCE_THRESHOLD: f32 = 0.6;
/// Nutrition confidence below this with nothing parsed adds manual entry.
pub const MANUAL_ENTRY_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    RetakePhoto,
    ImproveLighting,
    Reframe,
    ManualEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub priority: RecommendationPriority,
    pub message: String,
}

impl Recommendation {
    fn new(kind: RecommendationKind, priority: RecommendationPriority, message: &str) -> Self {
        Self {
            kind,
            priority,
            message: message.to_string(),
        }
    }
}

/// Scores the rules look at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationSignals {
    /// `None` when quality analysis was disabled.
    pub image_quality: Option<f32>,
    pub ocr_average_confidence: f32,
    pub nutrition_confidence: f32,
    /// Any nutrient or serving info parsed.
    pub has_data: bool,
}

pub fn recommend(signals: &RecommendationSignals) -> Vec<Recommendation> {
    use RecommendationKind::*;
    use RecommendationPriority::*;

    let mut out = Vec::new();

    if signals
        .image_quality
        .is_some_and(|q| q < IMAGE_QUALITY_THRESHOLD)
    {
        out.push(Recommendation::new(
            RetakePhoto,
            High,
            "Image quality is low. Retake the photo closer to the label with the camera steady.",
        ));
    }

    if signals.ocr_average_confidence < OCR_CONFIDENCE_THRESHOLD {
        out.push(Recommendation::new(
            ImproveLighting,
            Medium,
            "Text was hard to read. Try brighter, even lighting without glare.",
        ));
    }

    if signals.nutrition_confidence < NUTRITION_CONFIDENCE_THRESHOLD {
        if signals.has_data {
            out.push(Recommendation::new(
                Reframe,
                Medium,
                "Only part of the label was recognized. Frame the whole nutrition panel.",
            ));
        } else {
            out.push(Recommendation::new(
                RetakePhoto,
                High,
                "No nutrition facts were recognized. Retake the photo of the nutrition panel.",
            ));
            if signals.nutrition_confidence < MANUAL_ENTRY_THRESHOLD {
                out.push(Recommendation::new(
                    ManualEntry,
                    High,
                    "Enter the nutrition values manually.",
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(quality: Option<f32>, ocr: f32, nutrition: f32, has_data: bool) -> RecommendationSignals {
        RecommendationSignals {
            image_quality: quality,
            ocr_average_confidence: ocr,
            nutrition_confidence: nutrition,
            has_data,
        }
    }

    fn kinds(recs: &[Recommendation]) -> Vec<(RecommendationKind, RecommendationPriority)> {
        recs.iter().map(|r| (r.kind, r.priority)).collect()
    }

    #[test]
    fn confident_extraction_has_no_recommendations() {
        assert!(recommend(&signals(Some(0.9), 0.9, 0.9, true)).is_empty());
    }

    #[test]
    fn low_image_quality_asks_for_retake() {
        let recs = recommend(&signals(Some(0.5), 0.9, 0.9, true));
        assert_eq!(
            kinds(&recs),
            vec![(RecommendationKind::RetakePhoto, RecommendationPriority::High)]
        );
    }

    #[test]
    fn skipped_quality_analysis_never_fires() {
        assert!(recommend(&signals(None, 0.9, 0.9, true)).is_empty());
    }

    #[test]
    fn low_ocr_confidence_suggests_lighting() {
        let recs = recommend(&signals(Some(0.9), 0.65, 0.9, true));
        assert_eq!(
            kinds(&recs),
            vec![(RecommendationKind::ImproveLighting, RecommendationPriority::Medium)]
        );
    }

    #[test]
    fn partial_data_asks_for_reframe() {
        let recs = recommend(&signals(Some(0.9), 0.9, 0.5, true));
        assert_eq!(
            kinds(&recs),
            vec![(RecommendationKind::Reframe, RecommendationPriority::Medium)]
        );
    }

    #[test]
    fn no_data_asks_for_retake_and_manual_entry() {
        let recs = recommend(&signals(Some(0.9), 0.9, 0.0, false));
        assert_eq!(
            kinds(&recs),
            vec![
                (RecommendationKind::RetakePhoto, RecommendationPriority::High),
                (RecommendationKind::ManualEntry, RecommendationPriority::High),
            ]
        );
    }

    #[test]
    fn no_data_between_thresholds_only_retakes() {
        let recs = recommend(&signals(Some(0.9), 0.9, 0.4, false));
        assert_eq!(
            kinds(&recs),
            vec![(RecommendationKind::RetakePhoto, RecommendationPriority::High)]
        );
    }

    #[test]
    fn rules_accumulate_without_dedup() {
        let recs = recommend(&signals(Some(0.2), 0.3, 0.1, false));
        assert_eq!(
            kinds(&recs),
            vec![
                (RecommendationKind::RetakePhoto, RecommendationPriority::High),
                (RecommendationKind::ImproveLighting, RecommendationPriority::Medium),
                (RecommendationKind::RetakePhoto, RecommendationPriority::High),
                (RecommendationKind::ManualEntry, RecommendationPriority::High),
            ]
        );
        assert!(recs.iter().all(|r| !r.message.is_empty()));
    }

    #[test]
    fn thresholds_are_strict() {
        assert!(recommend(&signals(Some(0.6), 0.7, 0.6, true)).is_empty());
    }
}
