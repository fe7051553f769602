//! Contextual pass: read the scale display by its surroundings.
//!
//! Kitchen scales print a mode button ("M") and a count button ("PCS") on
//! either side of the display. A number lying on the segment between one of
//! each is the reading, whatever unit text the recognizer did or did not see.

use std::sync::LazyLock;

use regex::Regex;

use super::decimal::correct_decimal;
use super::types::{DetectedWeight, DetectionSource, WeightUnit};
use super::{compile, parse_decimal};
use crate::pipeline::extraction::{BoundingBox, TextFragment};
use crate::pipeline_config::WeightConfig;

/// Prefix of `original_text` for contextual candidates.
pub const CONTEXTUAL_MARKER: &str = "[scale-display]";

const MODE_LABELS: &[&str] = &["M", "M+", "MODE", "MEM", "MEMORY"];
const COUNT_LABELS: &[&str] = &["PCS", "PC", "PIECE", "PIECES", "COUNT"];

static DISPLAY_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"^\d+\.?\d*$"));

/// Fragments sorted into the roles the contextual pass cares about.
#[derive(Debug, Default)]
pub struct Anchors<'a> {
    pub mode: Vec<&'a TextFragment>,
    pub count: Vec<&'a TextFragment>,
    pub numbers: Vec<(&'a TextFragment, f64)>,
    pub units: Vec<(&'a TextFragment, WeightUnit)>,
}

pub fn classify(fragments: &[TextFragment]) -> Anchors<'_> {
    let mut anchors = Anchors::default();
    for fragment in fragments {
        let label = fragment.text.trim().to_uppercase();
        if MODE_LABELS.contains(&label.as_str()) {
            anchors.mode.push(fragment);
        } else if COUNT_LABELS.contains(&label.as_str()) {
            anchors.count.push(fragment);
        } else if let Some(unit) = WeightUnit::from_token(&fragment.text) {
            anchors.units.push((fragment, unit));
        } else if let Some(value) = parse_display_number(&fragment.text) {
            anchors.numbers.push((fragment, value));
        }
    }
    anchors
}

/// Undo common seven-segment misreads: O→0, l/I→1, S→5, comma→point.
/// Whitespace is dropped.
pub fn normalize_display_digits(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'O' => '0',
            'l' | 'I' => '1',
            'S' => '5',
            ',' => '.',
            _ => c,
        })
        .collect()
}

/// A display number, after normalization. Needs at least one real digit so
/// button labels like "SOS" are never read as numbers.
pub fn parse_display_number(text: &str) -> Option<f64> {
    if !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = normalize_display_digits(text);
    if !DISPLAY_NUMBER.as_ref()?.is_match(&normalized) {
        return None;
    }
    parse_decimal(&normalized)
}

/// Whether `point` lies on the segment `a`–`b`, within `tolerance` of detour.
pub fn is_between(point: &BoundingBox, a: &BoundingBox, b: &BoundingBox, tolerance: f32) -> bool {
    let detour = point.distance_to(a) + point.distance_to(b) - a.distance_to(b);
    detour.abs() < tolerance
}

fn nearest_unit(
    point: &BoundingBox,
    units: &[(&TextFragment, WeightUnit)],
    radius: f32,
) -> Option<WeightUnit> {
    units
        .iter()
        .map(|(fragment, unit)| (point.distance_to(&fragment.bounding_box), *unit))
        .filter(|(distance, _)| *distance <= radius)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, unit)| unit)
}

/// Numbers between any (mode, count) anchor pair, decimal-corrected and
/// boosted.
pub fn detect_contextual(fragments: &[TextFragment], config: &WeightConfig) -> Vec<DetectedWeight> {
    let anchors = classify(fragments);
    if anchors.mode.is_empty() || anchors.count.is_empty() {
        return Vec::new();
    }

    anchors
        .numbers
        .iter()
        .filter(|(fragment, _)| {
            anchors.mode.iter().any(|m| {
                anchors.count.iter().any(|c| {
                    is_between(
                        &fragment.bounding_box,
                        &m.bounding_box,
                        &c.bounding_box,
                        config.collinearity_tolerance,
                    )
                })
            })
        })
        .map(|(fragment, raw)| DetectedWeight {
            value: correct_decimal(*raw),
            unit: nearest_unit(&fragment.bounding_box, &anchors.units, config.unit_search_radius)
                .unwrap_or(WeightUnit::Grams),
            confidence: (fragment.confidence * config.contextual_boost).min(1.0),
            bounding_box: fragment.bounding_box,
            original_text: format!("{CONTEXTUAL_MARKER} {}", fragment.text.trim()),
            source: DetectionSource::Contextual,
        })
        .collect()
}
