use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::BoundingBox;

/// Units a scale or package can display.
///
/// Volumes convert at water density (1 ml = 1 g).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightUnit {
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "oz")]
    Ounces,
    #[serde(rename = "lb")]
    Pounds,
    #[serde(rename = "ml")]
    Milliliters,
    #[serde(rename = "l")]
    Liters,
}

impl WeightUnit {
    pub const ALL: [WeightUnit; 6] = [
        Self::Grams,
        Self::Kilograms,
        Self::Ounces,
        Self::Pounds,
        Self::Milliliters,
        Self::Liters,
    ];

    pub fn grams_per_unit(self) -> f64 {
        match self {
            Self::Grams => 1.0,
            Self::Kilograms => 1000.0,
            Self::Ounces => 28.3495,
            Self::Pounds => 453.592,
            Self::Milliliters => 1.0,
            Self::Liters => 1000.0,
        }
    }

    pub fn convert_to_grams(self, value: f64) -> f64 {
        value * self.grams_per_unit()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Grams => "g",
            Self::Kilograms => "kg",
            Self::Ounces => "oz",
            Self::Pounds => "lb",
            Self::Milliliters => "ml",
            Self::Liters => "l",
        }
    }

    /// Parse a unit token as printed on a display or package ("g", "KG",
    /// "lbs", "Ounces"). `None` for anything else.
    pub fn from_token(token: &str) -> Option<Self> {
        let unit = match token.trim().to_lowercase().as_str() {
            "g" | "gr" | "gram" | "grams" => Self::Grams,
            "kg" | "kilo" | "kilos" | "kilogram" | "kilograms" => Self::Kilograms,
            "oz" | "ounce" | "ounces" => Self::Ounces,
            "lb" | "lbs" | "pound" | "pounds" => Self::Pounds,
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => Self::Milliliters,
            "l" | "liter" | "liters" | "litre" | "litres" => Self::Liters,
            _ => return None,
        };
        Some(unit)
    }
}

impl std::fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Direct-pass pattern forms, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectPattern {
    /// "354 g", "1.5kg"
    ValueWithUnit,
    /// "354:2" read as 354.2
    ColonDecimal,
    /// "3 5 4" read as 354
    SpacedDigits,
    /// "Net Wt. 500", "Weight: 12 oz"
    Labeled,
    /// "354"
    BareNumber,
}

impl DirectPattern {
    pub const ORDER: [DirectPattern; 5] = [
        Self::ValueWithUnit,
        Self::ColonDecimal,
        Self::SpacedDigits,
        Self::Labeled,
        Self::BareNumber,
    ];

    /// Multiplied by the fragment confidence.
    pub fn confidence_factor(self) -> f32 {
        match self {
            Self::ValueWithUnit => 0.95,
            Self::ColonDecimal => 0.85,
            Self::SpacedDigits => 0.70,
            Self::Labeled => 0.90,
            Self::BareNumber => 0.60,
        }
    }

    /// Unitless display readings may have lost their decimal point. Forms with
    /// an explicit unit or label are taken literally.
    pub fn applies_decimal_correction(self) -> bool {
        matches!(self, Self::SpacedDigits | Self::BareNumber)
    }
}

/// Which pass produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "pass", content = "pattern")]
pub enum DetectionSource {
    /// Value found between a mode anchor and a count anchor.
    Contextual,
    Direct(DirectPattern),
}

impl DetectionSource {
    pub fn is_contextual(self) -> bool {
        matches!(self, Self::Contextual)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedWeight {
    pub value: f64,
    pub unit: WeightUnit,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    pub original_text: String,
    pub source: DetectionSource,
}

impl DetectedWeight {
    pub fn grams(&self) -> f64 {
        self.unit.convert_to_grams(self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightDetectionResult {
    /// Contextual candidates first, then by descending confidence.
    pub detected_weights: Vec<DetectedWeight>,
    pub processing_time: Duration,
    /// Highest candidate confidence, 0 when empty.
    pub confidence: f32,
}

impl WeightDetectionResult {
    pub fn empty() -> Self {
        Self {
            detected_weights: Vec::new(),
            processing_time: Duration::ZERO,
            confidence: 0.0,
        }
    }

    /// Highest-confidence candidate; the earliest one on ties.
    pub fn best_weight(&self) -> Option<&DetectedWeight> {
        self.detected_weights
            .iter()
            .reduce(|best, w| if w.confidence > best.confidence { w } else { best })
    }

    pub fn has_valid_weight(&self) -> bool {
        self.best_weight().is_some_and(|w| w.confidence > 0.5)
    }

    pub fn is_empty(&self) -> bool {
        self.detected_weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(value: f64, confidence: f32, source: DetectionSource) -> DetectedWeight {
        DetectedWeight {
            value,
            unit: WeightUnit::Grams,
            confidence,
            bounding_box: BoundingBox::new(0.0, 0.0, 0.1, 0.1),
            original_text: value.to_string(),
            source,
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(WeightUnit::Grams.convert_to_grams(5.0), 5.0);
        assert_eq!(WeightUnit::Kilograms.convert_to_grams(1.5), 1500.0);
        assert!((WeightUnit::Ounces.convert_to_grams(1.0) - 28.3495).abs() < 1e-9);
        assert!((WeightUnit::Pounds.convert_to_grams(2.0) - 907.184).abs() < 1e-9);
        assert_eq!(WeightUnit::Milliliters.convert_to_grams(250.0), 250.0);
        assert_eq!(WeightUnit::Liters.convert_to_grams(1.0), 1000.0);
    }

    #[test]
    fn unit_tokens() {
        assert_eq!(WeightUnit::from_token("G"), Some(WeightUnit::Grams));
        assert_eq!(WeightUnit::from_token(" kg "), Some(WeightUnit::Kilograms));
        assert_eq!(WeightUnit::from_token("lbs"), Some(WeightUnit::Pounds));
        assert_eq!(WeightUnit::from_token("Ounces"), Some(WeightUnit::Ounces));
        assert_eq!(WeightUnit::from_token("L"), Some(WeightUnit::Liters));
        assert_eq!(WeightUnit::from_token("PCS"), None);
        for unit in WeightUnit::ALL {
            assert_eq!(WeightUnit::from_token(unit.symbol()), Some(unit));
        }
    }

    #[test]
    fn unit_serializes_as_symbol() {
        assert_eq!(serde_json::to_string(&WeightUnit::Kilograms).unwrap(), "\"kg\"");
    }

    #[test]
    fn best_weight_is_max_confidence() {
        let result = WeightDetectionResult {
            detected_weights: vec![
                weight(35.4, 0.6, DetectionSource::Contextual),
                weight(200.0, 0.9, DetectionSource::Direct(DirectPattern::ValueWithUnit)),
            ],
            processing_time: Duration::ZERO,
            confidence: 0.9,
        };
        assert_eq!(result.best_weight().unwrap().value, 200.0);
        assert!(result.has_valid_weight());
    }

    #[test]
    fn valid_weight_needs_confidence_above_half() {
        let mut result = WeightDetectionResult::empty();
        assert!(!result.has_valid_weight());
        assert!(result.best_weight().is_none());

        result
            .detected_weights
            .push(weight(35.4, 0.5, DetectionSource::Direct(DirectPattern::BareNumber)));
        assert!(!result.has_valid_weight());

        result.detected_weights[0].confidence = 0.51;
        assert!(result.has_valid_weight());
    }

    #[test]
    fn pattern_table() {
        assert_eq!(DirectPattern::ORDER[0], DirectPattern::ValueWithUnit);
        assert_eq!(DirectPattern::ORDER[4], DirectPattern::BareNumber);
        assert!(DirectPattern::BareNumber.applies_decimal_correction());
        assert!(DirectPattern::SpacedDigits.applies_decimal_correction());
        assert!(!DirectPattern::ValueWithUnit.applies_decimal_correction());
        assert!(!DirectPattern::Labeled.applies_decimal_correction());
    }
}
