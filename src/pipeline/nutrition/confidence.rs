//! Confidence scoring for nutrition matches and parse results.
//!
//! These numbers are a tuned policy table, not a model. Keep them as
//! constants; changing one changes parser output for ambiguous labels.

use super::patterns::PANEL_MARKER;
use super::types::{
    ConfidenceProfile, NutrientCategory, NutrientType, NutrientValue, ParsedNutritionData,
};

// ── Per-match scoring ─────────────────────────────────────

pub const MATCH_BASE: f32 = 0.7;
pub const KEYWORD_BONUS: f32 = 0.2;
pub const COLON_BONUS: f32 = 0.1;
pub const UNIT_BONUS: f32 = 0.1;

// ── Category weights (sum to 1) ───────────────────────────

pub const SERVING_WEIGHT: f32 = 0.2;
pub const CALORIES_WEIGHT: f32 = 0.3;
pub const MACRO_WEIGHT: f32 = 0.3;
pub const MICRO_WEIGHT: f32 = 0.1;
pub const FORMAT_WEIGHT: f32 = 0.1;

// ── Format recognition ────────────────────────────────────

/// Header or %DV column present.
const FORMAT_MARKED: f32 = 1.0;
/// No marker, but enough nutrients to look like a panel.
const FORMAT_DENSE: f32 = 0.5;
const FORMAT_DENSE_MIN_NUTRIENTS: usize = 3;
const FORMAT_SPARSE: f32 = 0.25;

/// Score one match: base, plus bonuses for the literal keyword, a colon
/// separator, and an explicit unit token. Clamped to 1.
pub fn score_match(matched_text: &str, nutrient: NutrientType, has_unit: bool) -> f32 {
    let lower = matched_text.to_lowercase();
    let mut score = MATCH_BASE;
    if lower.contains(nutrient.keyword()) {
        score += KEYWORD_BONUS;
    }
    if matched_text.contains(':') {
        score += COLON_BONUS;
    }
    if has_unit {
        score += UNIT_BONUS;
    }
    score.min(1.0)
}

/// How strongly the text looks like a nutrition panel.
pub fn format_recognition_score(text: &str, resolved_nutrients: usize) -> f32 {
    let marked = PANEL_MARKER
        .as_ref()
        .is_some_and(|re| re.is_match(text));
    if marked {
        FORMAT_MARKED
    } else if resolved_nutrients >= FORMAT_DENSE_MIN_NUTRIENTS {
        FORMAT_DENSE
    } else {
        FORMAT_SPARSE
    }
}

/// Arithmetic mean of resolved-value confidences; `None` when empty.
fn category_mean<'a>(values: impl Iterator<Item = &'a NutrientValue>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v.confidence, n + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Build the confidence profile for a parse result.
///
/// Each category scores the mean of its resolved values (0 when empty). The
/// overall score is the fixed-weight average over the categories that carry
/// data, so a label without serving info or vitamins is not capped below the
/// confidence of what it does show. Format recognition counts whenever any
/// data was found. No data at all → 0.
pub fn build_profile(data: &ParsedNutritionData, text: &str) -> ConfidenceProfile {
    let serving = data.serving_info.as_ref().map(|s| s.confidence);
    let calories = category_mean(data.values_in(NutrientCategory::Calories));
    let macros = category_mean(data.values_in(NutrientCategory::Macronutrient));
    let micros = category_mean(data.values_in(NutrientCategory::Micronutrient));
    let format = data
        .has_any_data()
        .then(|| format_recognition_score(text, data.resolved_count()));

    let weighted = [
        (serving, SERVING_WEIGHT),
        (calories, CALORIES_WEIGHT),
        (macros, MACRO_WEIGHT),
        (micros, MICRO_WEIGHT),
        (format, FORMAT_WEIGHT),
    ];
    let (sum, total_weight) = weighted
        .iter()
        .filter_map(|(score, weight)| score.map(|s| (s * weight, *weight)))
        .fold((0.0f32, 0.0f32), |(s, w), (ds, dw)| (s + ds, w + dw));
    let overall_score = if total_weight > 0.0 {
        (sum / total_weight).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ConfidenceProfile {
        serving: serving.unwrap_or(0.0),
        calories: calories.unwrap_or(0.0),
        macronutrients: macros.unwrap_or(0.0),
        micronutrients: micros.unwrap_or(0.0),
        format_recognition: format.unwrap_or(0.0),
        overall_score,
    }
}
