use std::time::Instant;

use super::contextual::detect_contextual;
use super::direct::detect_direct;
use super::types::{DetectedWeight, WeightDetectionResult};
use crate::pipeline::extraction::TextFragment;
use crate::pipeline_config::WeightConfig;

/// Readings at or below this many grams are noise.
pub const MIN_GRAMS: f64 = 0.1;
/// Readings at or above this many grams exceed any kitchen scale.
pub const MAX_GRAMS: f64 = 50_000.0;

/// Candidates closer than `max(DEDUP_MIN_GRAMS, DEDUP_RATIO × grams)` are the
/// same reading.
const DEDUP_MIN_GRAMS: f64 = 5.0;
const DEDUP_RATIO: f64 = 0.05;

/// Finds weight readings in recognized fragments. Pure and deterministic.
pub struct WeightDetector {
    config: WeightConfig,
}

impl WeightDetector {
    pub fn new(config: WeightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn detect(&self, fragments: &[TextFragment]) -> WeightDetectionResult {
        let start = Instant::now();

        let contextual = detect_contextual(fragments, &self.config);
        let direct = detect_direct(fragments);
        let raw_count = contextual.len() + direct.len();

        let valid: Vec<DetectedWeight> = contextual
            .into_iter()
            .chain(direct)
            .filter(is_valid_weight)
            .collect();
        let valid_count = valid.len();

        let mut detected_weights = deduplicate(valid);
        rank(&mut detected_weights);

        let confidence = detected_weights
            .iter()
            .map(|w| w.confidence)
            .fold(0.0f32, f32::max);

        tracing::debug!(
            candidates = raw_count,
            valid = valid_count,
            kept = detected_weights.len(),
            confidence,
            "Weight detection complete"
        );

        WeightDetectionResult {
            detected_weights,
            processing_time: start.elapsed(),
            confidence,
        }
    }
}

impl Default for WeightDetector {
    fn default() -> Self {
        Self::new(WeightConfig::default())
    }
}

/// Within the exclusive (0.1, 50 000) gram range.
pub fn is_valid_weight(weight: &DetectedWeight) -> bool {
    let grams = weight.grams();
    grams > MIN_GRAMS && grams < MAX_GRAMS
}

/// Collapse candidates that describe the same reading.
///
/// Each candidate is compared against the already-kept ones. Within a group a
/// contextual candidate replaces a direct one regardless of confidence;
/// otherwise the higher confidence stays.
pub fn deduplicate(candidates: Vec<DetectedWeight>) -> Vec<DetectedWeight> {
    let mut kept: Vec<DetectedWeight> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let grams = candidate.grams();
        let duplicate = kept.iter_mut().find(|k| {
            let tolerance = DEDUP_MIN_GRAMS.max(DEDUP_RATIO * k.grams());
            (k.grams() - grams).abs() < tolerance
        });

        match duplicate {
            Some(existing) => {
                let candidate_ctx = candidate.source.is_contextual();
                let existing_ctx = existing.source.is_contextual();
                let replace = (candidate_ctx && !existing_ctx)
                    || (candidate_ctx == existing_ctx && candidate.confidence > existing.confidence);
                if replace {
                    *existing = candidate;
                }
            }
            None => kept.push(candidate),
        }
    }
    kept
}

/// Contextual first, then descending confidence. Stable.
fn rank(weights: &mut [DetectedWeight]) {
    weights.sort_by(|a, b| {
        b.source
            .is_contextual()
            .cmp(&a.source.is_contextual())
            .then(b.confidence.total_cmp(&a.confidence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::BoundingBox;
    use crate::pipeline::weight::contextual::CONTEXTUAL_MARKER;
    use crate::pipeline::weight::types::{DetectionSource, DirectPattern, WeightUnit};

    fn candidate(value: f64, unit: WeightUnit, confidence: f32, source: DetectionSource) -> DetectedWeight {
        DetectedWeight {
            value,
            unit,
            confidence,
            bounding_box: BoundingBox::new(0.0, 0.0, 0.1, 0.1),
            original_text: value.to_string(),
            source,
        }
    }

    fn direct(value: f64, confidence: f32) -> DetectedWeight {
        candidate(
            value,
            WeightUnit::Grams,
            confidence,
            DetectionSource::Direct(DirectPattern::ValueWithUnit),
        )
    }

    fn at(text: &str, cx: f32, cy: f32, confidence: f32) -> TextFragment {
        TextFragment::new(text, confidence, BoundingBox::centered(cx, cy, 0.1, 0.05))
    }

    #[test]
    fn scale_display_scenario() {
        let fragments = vec![
            at("M", 0.2, 0.5, 0.8),
            at("354", 0.5, 0.5, 0.8),
            at("PCS", 0.8, 0.5, 0.8),
        ];
        let result = WeightDetector::default().detect(&fragments);

        assert_eq!(result.detected_weights.len(), 1);
        let best = result.best_weight().unwrap();
        assert_eq!(best.value, 35.4);
        assert_eq!(best.unit, WeightUnit::Grams);
        assert!(best.confidence >= 0.8 * 1.2);
        assert!(best.original_text.contains(CONTEXTUAL_MARKER));
        assert!(result.has_valid_weight());
        assert_eq!(result.confidence, best.confidence);
    }

    #[test]
    fn validation_bounds() {
        let g = |grams| direct(grams, 0.9);
        assert!(!is_valid_weight(&g(0.05)));
        assert!(!is_valid_weight(&g(0.1)));
        assert!(!is_valid_weight(&g(50_000.0)));
        assert!(is_valid_weight(&g(50_000.0 - 1e-6)));
        assert!(is_valid_weight(&g(0.2)));
        assert!(!is_valid_weight(&candidate(
            60.0,
            WeightUnit::Kilograms,
            0.9,
            DetectionSource::Direct(DirectPattern::ValueWithUnit),
        )));
    }

    #[test]
    fn out_of_range_readings_dropped() {
        let fragments = vec![
            at("0.05 g", 0.5, 0.1, 0.9),
            at("50 kg", 0.5, 0.3, 0.9),
            at("49.99 kg", 0.5, 0.5, 0.9),
        ];
        let result = WeightDetector::default().detect(&fragments);
        assert_eq!(result.detected_weights.len(), 1);
        assert_eq!(result.detected_weights[0].value, 49.99);
    }

    #[test]
    fn near_values_collapse() {
        let kept = deduplicate(vec![direct(100.0, 0.7), direct(103.0, 0.9)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].value, 103.0);
    }

    #[test]
    fn contextual_beats_direct_despite_confidence() {
        let contextual = candidate(100.0, WeightUnit::Grams, 0.5, DetectionSource::Contextual);
        let kept = deduplicate(vec![direct(100.0, 0.95), contextual.clone()]);
        assert_eq!(kept, vec![contextual.clone()]);

        let kept = deduplicate(vec![contextual.clone(), direct(100.0, 0.95)]);
        assert_eq!(kept, vec![contextual]);
    }

    #[test]
    fn tolerance_scales_with_value() {
        // 5% of 1000 g is 50 g
        assert_eq!(deduplicate(vec![direct(1000.0, 0.9), direct(1040.0, 0.8)]).len(), 1);
        assert_eq!(deduplicate(vec![direct(1000.0, 0.9), direct(1060.0, 0.8)]).len(), 2);
        // Floor of 5 g for small values
        assert_eq!(deduplicate(vec![direct(10.0, 0.9), direct(14.0, 0.8)]).len(), 1);
        assert_eq!(deduplicate(vec![direct(10.0, 0.9), direct(16.0, 0.8)]).len(), 2);
    }

    #[test]
    fn units_compared_in_grams() {
        let kg = candidate(
            1.0,
            WeightUnit::Kilograms,
            0.9,
            DetectionSource::Direct(DirectPattern::ValueWithUnit),
        );
        assert_eq!(deduplicate(vec![kg, direct(1000.0, 0.8)]).len(), 1);
    }

    #[test]
    fn ranking_contextual_first_then_confidence() {
        let fragments = vec![
            at("M", 0.2, 0.5, 0.4),
            at("120", 0.5, 0.5, 0.4),
            at("PCS", 0.8, 0.5, 0.4),
            at("500 g", 0.5, 0.9, 1.0),
            at("Net Wt. 2000", 0.5, 0.95, 0.9),
        ];
        let result = WeightDetector::default().detect(&fragments);
        let sources: Vec<_> = result.detected_weights.iter().map(|w| w.source).collect();
        assert_eq!(
            sources,
            vec![
                DetectionSource::Contextual,
                DetectionSource::Direct(DirectPattern::ValueWithUnit),
                DetectionSource::Direct(DirectPattern::Labeled),
            ]
        );
        // Best is by confidence, not by rank
        assert_eq!(result.best_weight().unwrap().value, 500.0);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn empty_input() {
        let result = WeightDetector::default().detect(&[]);
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert!(!result.has_valid_weight());
    }

    #[test]
    fn detection_is_deterministic() {
        let fragments = vec![
            at("M", 0.2, 0.5, 0.8),
            at("354", 0.5, 0.5, 0.8),
            at("PCS", 0.8, 0.5, 0.8),
            at("250 g", 0.5, 0.9, 0.9),
        ];
        let detector = WeightDetector::default();
        let a = detector.detect(&fragments);
        let b = detector.detect(&fragments);
        assert_eq!(a.detected_weights, b.detected_weights);
        assert_eq!(a.confidence, b.confidence);
    }
}
