//! Direct pass: per-fragment weight patterns.
//!
//! Patterns are tried in [`DirectPattern::ORDER`]; the first one that yields
//! a value wins for that fragment.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::decimal::correct_decimal;
use super::types::{DetectedWeight, DetectionSource, DirectPattern, WeightUnit};
use super::{compile, parse_decimal};
use crate::pipeline::extraction::TextFragment;

struct DirectRule {
    pattern: DirectPattern,
    regex: Regex,
}

static DIRECT_RULES: LazyLock<Vec<DirectRule>> = LazyLock::new(|| {
    DirectPattern::ORDER
        .into_iter()
        .filter_map(|pattern| {
            Some(DirectRule {
                pattern,
                regex: compile(pattern_source(pattern))?,
            })
        })
        .collect()
});

fn pattern_source(pattern: DirectPattern) -> &'static str {
    match pattern {
        DirectPattern::ValueWithUnit => {
            r"(?i)(?P<num>\d+(?:[.,]\d+)?)[ \t]*(?P<unit>kilograms?|kilos?|kg|grams?|gr|g|ounces?|oz|pounds?|lbs?|milliliters?|millilitres?|ml|liters?|litres?|l)\b"
        }
        DirectPattern::ColonDecimal => r"^(?P<int>\d+)[ \t]*:[ \t]*(?P<frac>\d+)$",
        DirectPattern::SpacedDigits => r"^(?P<digits>\d+(?:[ \t]+\d+)+)$",
        DirectPattern::Labeled => {
            r"(?i)\b(?:net[ \t]*wt\.?|net[ \t]+weight|weight)[ \t]*[:.]?[ \t]*(?P<num>\d+(?:[.,]\d+)?)"
        }
        DirectPattern::BareNumber => r"^(?P<num>\d+(?:[.,]\d+)?)$",
    }
}

/// Raw value and explicit unit, if the captures hold a usable number.
fn read_value(pattern: DirectPattern, caps: &Captures<'_>) -> Option<(f64, Option<WeightUnit>)> {
    match pattern {
        DirectPattern::ValueWithUnit => {
            let value = parse_decimal(caps.name("num")?.as_str())?;
            let unit = WeightUnit::from_token(caps.name("unit")?.as_str())?;
            Some((value, Some(unit)))
        }
        DirectPattern::ColonDecimal => {
            let int = caps.name("int")?.as_str();
            let frac = caps.name("frac")?.as_str();
            let value = format!("{int}.{frac}").parse().ok()?;
            Some((value, None))
        }
        DirectPattern::SpacedDigits => {
            let digits: String = caps.name("digits")?.as_str().split_whitespace().collect();
            Some((digits.parse().ok()?, None))
        }
        DirectPattern::Labeled | DirectPattern::BareNumber => {
            Some((parse_decimal(caps.name("num")?.as_str())?, None))
        }
    }
}

/// First pattern hit for one fragment.
pub fn match_fragment(fragment: &TextFragment) -> Option<DetectedWeight> {
    let text = fragment.text.trim();
    if !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    DIRECT_RULES.iter().find_map(|rule| {
        let caps = rule.regex.captures(text)?;
        let (raw, unit) = read_value(rule.pattern, &caps)?;
        let value = if rule.pattern.applies_decimal_correction() {
            correct_decimal(raw)
        } else {
            raw
        };
        Some(DetectedWeight {
            value,
            unit: unit.unwrap_or(WeightUnit::Grams),
            confidence: rule.pattern.confidence_factor() * fragment.confidence,
            bounding_box: fragment.bounding_box,
            original_text: text.to_string(),
            source: DetectionSource::Direct(rule.pattern),
        })
    })
}

pub fn detect_direct(fragments: &[TextFragment]) -> Vec<DetectedWeight> {
    fragments.iter().filter_map(match_fragment).collect()
}
