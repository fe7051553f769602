//! Pipeline configuration.
//!
//! One explicit value per coordinator/orchestrator instance. Nothing here is
//! process-wide: two orchestrators built from different configs coexist.
//! Every field has a documented default, so a partial TOML file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// OCR coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Images scoring below this are rejected before recognition. Default: 0.6.
    pub minimum_quality_score: f32,
    /// Hard deadline for the recognition step. Default: 30 000 ms.
    pub max_processing_time_ms: u64,
    /// Run the quality assessor before recognition. Default: true.
    pub enable_quality_analysis: bool,
    /// Run the image preprocessor before recognition. Default: true.
    pub enable_preprocessing: bool,
    /// Recognition languages passed to the engine (BCP 47). Default: ["en-US"].
    pub languages: Vec<String>,
    /// Extra vocabulary hints for the engine.
    pub custom_vocabulary: Vec<String>,
    /// Fragments below this engine confidence are dropped. Default: 0.0.
    pub min_fragment_confidence: f32,
    /// Engine-level timeout hint, distinct from the coordinator deadline.
    /// Default: 25 000 ms.
    pub engine_timeout_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            minimum_quality_score: 0.6,
            max_processing_time_ms: 30_000,
            enable_quality_analysis: true,
            enable_preprocessing: true,
            languages: vec!["en-US".to_string()],
            custom_vocabulary: default_vocabulary(),
            min_fragment_confidence: 0.0,
            engine_timeout_ms: 25_000,
        }
    }
}

impl OcrConfig {
    pub fn max_processing_time(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

/// Nutrition parser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Matches scoring below this are discarded. Default: 0.6.
    pub minimum_match_confidence: f32,
    /// Correct near-miss nutrient keywords before matching. Default: true.
    pub enable_fuzzy_matching: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            minimum_match_confidence: 0.6,
            enable_fuzzy_matching: true,
        }
    }
}

/// Weight reading parser settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Slack for the "between two anchors" test. Default: 0.3.
    pub collinearity_tolerance: f32,
    /// Max distance from a value to a unit fragment. Default: 0.2.
    pub unit_search_radius: f32,
    /// Confidence multiplier for anchor-matched values. Default: 1.2.
    pub contextual_boost: f32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            collinearity_tolerance: 0.3,
            unit_search_radius: 0.2,
            contextual_boost: 1.2,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ocr: OcrConfig,
    pub parser: ParserConfig,
    pub weight: WeightConfig,
}

// ═══════════════════════════════════════════════════════════
// Loading & validation
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "Pipeline config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("ocr.minimum_quality_score", self.ocr.minimum_quality_score)?;
        check_unit_range("ocr.min_fragment_confidence", self.ocr.min_fragment_confidence)?;
        check_unit_range(
            "parser.minimum_match_confidence",
            self.parser.minimum_match_confidence,
        )?;

        if self.ocr.max_processing_time_ms == 0 {
            return Err(ConfigError::Invalid(
                "ocr.max_processing_time_ms must be greater than zero".into(),
            ));
        }
        if self.ocr.languages.is_empty() {
            return Err(ConfigError::Invalid(
                "ocr.languages must name at least one language".into(),
            ));
        }
        if !(self.weight.collinearity_tolerance > 0.0) {
            return Err(ConfigError::Invalid(
                "weight.collinearity_tolerance must be positive".into(),
            ));
        }
        if !(self.weight.unit_search_radius > 0.0) {
            return Err(ConfigError::Invalid(
                "weight.unit_search_radius must be positive".into(),
            ));
        }
        if !(self.weight.contextual_boost >= 1.0) {
            return Err(ConfigError::Invalid(
                "weight.contextual_boost must be at least 1.0".into(),
            ));
        }
        Ok(())
    }
}

fn check_unit_range(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Nutrient keywords handed to the engine as vocabulary hints.
fn default_vocabulary() -> Vec<String> {
    [
        "Nutrition Facts",
        "Serving Size",
        "Calories",
        "Protein",
        "Carbohydrate",
        "Cholesterol",
        "Saturated",
        "Sodium",
        "Potassium",
        "Calcium",
        "Vitamin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
