use serde::{Deserialize, Serialize};

use super::types::TextFragment;

/// Fragments below this count as low confidence.
pub const LOW_CONFIDENCE: f32 = 0.50;

/// Summary of fragment confidences for one recognition pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    pub count: usize,
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    /// Fragments below [`LOW_CONFIDENCE`].
    pub low_confidence_count: usize,
}

impl ConfidenceDistribution {
    pub fn from_fragments(fragments: &[TextFragment]) -> Self {
        if fragments.is_empty() {
            return Self::default();
        }

        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut low = 0;

        for f in fragments {
            sum += f.confidence as f64;
            min = min.min(f.confidence);
            max = max.max(f.confidence);
            if f.confidence < LOW_CONFIDENCE {
                low += 1;
            }
        }

        Self {
            count: fragments.len(),
            mean: (sum / fragments.len() as f64) as f32,
            min,
            max,
            low_confidence_count: low,
        }
    }
}

/// Fragments below `threshold`, in input order, for highlighting in a review screen.
pub fn flag_low_confidence_fragments(
    fragments: &[TextFragment],
    threshold: f32,
) -> Vec<TextFragment> {
    fragments
        .iter()
        .filter(|f| f.confidence < threshold)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::BoundingBox;

    fn frag(text: &str, confidence: f32) -> TextFragment {
        TextFragment::new(text, confidence, BoundingBox::new(0.0, 0.0, 0.1, 0.1))
    }

    #[test]
    fn empty_distribution_is_zero() {
        let dist = ConfidenceDistribution::from_fragments(&[]);
        assert_eq!(dist, ConfidenceDistribution::default());
        assert_eq!(dist.mean, 0.0);
    }

    #[test]
    fn distribution_stats() {
        let frags = vec![frag("a", 0.9), frag("b", 0.4), frag("c", 0.8)];
        let dist = ConfidenceDistribution::from_fragments(&frags);
        assert_eq!(dist.count, 3);
        assert!((dist.mean - 0.7).abs() < 1e-5);
        assert!((dist.min - 0.4).abs() < f32::EPSILON);
        assert!((dist.max - 0.9).abs() < f32::EPSILON);
        assert_eq!(dist.low_confidence_count, 1);
    }

    #[test]
    fn flag_fragments_below_threshold() {
        let frags = vec![frag("clear", 0.90), frag("blurry", 0.40), frag("medium", 0.65)];
        let flagged = flag_low_confidence_fragments(&frags, 0.70);
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].text, "blurry");
        assert_eq!(flagged[1].text, "medium");
    }
}
