use std::ops::Range;

use regex::Captures;

use super::confidence::{build_profile, score_match, COLON_BONUS, KEYWORD_BONUS, MATCH_BASE, UNIT_BONUS};
use super::correction::{correct_keywords, CorrectedText};
use super::patterns::{
    canonical_unit, parse_number, NutrientPattern, PatternForm, LABEL_FIRST_PATTERNS,
    SERVINGS_PER_CONTAINER, SERVINGS_VALUE_FIRST, SERVING_AMOUNT, SERVING_GRAMS, SERVING_SIZE,
    VALUE_FIRST_PATTERNS,
};
use super::types::{NutrientMatch, NutrientValue, ParsedNutritionData, ServingInfo};
use crate::pipeline::extraction::{linearize, TextFragment};
use crate::pipeline_config::ParserConfig;

/// Turns recognized label text into typed nutrition facts.
///
/// Pure and deterministic: the same fragments always give the same result.
/// Never fails; missing nutrients are `None`.
pub struct NutritionParser {
    config: ParserConfig,
}

impl NutritionParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Linearize fragments in reading order, then parse the text.
    pub fn parse(&self, fragments: &[TextFragment]) -> ParsedNutritionData {
        self.parse_text(&linearize(fragments))
    }

    pub fn parse_text(&self, text: &str) -> ParsedNutritionData {
        if text.trim().is_empty() {
            return ParsedNutritionData::empty();
        }

        let corrected = self.prepare_text(text);
        let matches = self.find_matches_in(&corrected);

        let mut data = ParsedNutritionData::empty();
        for m in resolve_first_matches(&matches) {
            data.set(m.nutrient_type, NutrientValue::from(m));
        }
        data.serving_info = parse_serving(&corrected.text);
        data.confidence = build_profile(&data, &corrected.text);

        tracing::debug!(
            matches = matches.len(),
            resolved = data.resolved_count(),
            corrections = corrected.corrections.len(),
            overall = data.confidence.overall_score,
            "Nutrition text parsed"
        );
        data
    }

    /// Every accepted match, sorted by position then confidence (descending).
    pub fn find_matches(&self, text: &str) -> Vec<NutrientMatch> {
        self.find_matches_in(&self.prepare_text(text))
    }

    // ── Internal ────────────────────────────────────────────

    fn prepare_text(&self, text: &str) -> CorrectedText {
        if self.config.enable_fuzzy_matching {
            correct_keywords(text)
        } else {
            CorrectedText {
                text: text.to_string(),
                corrections: Vec::new(),
            }
        }
    }

    fn find_matches_in(&self, corrected: &CorrectedText) -> Vec<NutrientMatch> {
        let text = corrected.text.as_str();
        let mut matches = Vec::new();
        // Numbers owned by a label-first match
        let mut claimed: Vec<Range<usize>> = Vec::new();

        for pattern in LABEL_FIRST_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(text) {
                if let Some((m, number)) = build_match(pattern, &caps, text, corrected) {
                    claimed.push(number);
                    matches.push(m);
                }
            }
        }

        for pattern in VALUE_FIRST_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(text) {
                if let Some((m, number)) = build_match(pattern, &caps, text, corrected) {
                    if claimed.iter().any(|c| overlaps(c, &number)) {
                        continue;
                    }
                    matches.push(m);
                }
            }
        }

        matches.retain(|m| m.confidence >= self.config.minimum_match_confidence);
        matches.sort_by(|a, b| {
            a.source_range
                .start
                .cmp(&b.source_range.start)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        matches
    }
}

impl Default for NutritionParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

/// First match per nutrient in position order. Earliest wins even when a
/// later match scores higher: labels list each nutrient top to bottom once,
/// and later hits are usually %DV rows or footnotes.
pub fn resolve_first_matches(matches: &[NutrientMatch]) -> Vec<&NutrientMatch> {
    let mut seen = Vec::new();
    matches
        .iter()
        .filter(|m| {
            if seen.contains(&m.nutrient_type) {
                false
            } else {
                seen.push(m.nutrient_type);
                true
            }
        })
        .collect()
}

/// Build a match from one regex hit. `None` for percent-column values,
/// sub-row labels, and unparseable numbers. Also returns the number span.
fn build_match(
    pattern: &NutrientPattern,
    caps: &Captures<'_>,
    text: &str,
    corrected: &CorrectedText,
) -> Option<(NutrientMatch, Range<usize>)> {
    let whole = caps.get(0)?;
    let number = caps.name("num")?;

    // "Calcium 20%" is a %DV column entry, not an amount
    if caps.name("pct").is_some() {
        return None;
    }
    if pattern.form == PatternForm::LabelFirst
        && preceded_by_excluded(text, whole.start(), pattern.excluded_prefixes)
    {
        return None;
    }

    let value = parse_number(number.as_str())?;
    let unit_token = caps.name("unit");
    let matched_text = whole.as_str().trim();
    let range = whole.range();

    Some((
        NutrientMatch {
            nutrient_type: pattern.nutrient,
            value,
            unit: unit_token
                .map(|u| canonical_unit(u.as_str()))
                .unwrap_or_else(|| pattern.nutrient.default_unit().to_string()),
            original_text: matched_text.to_string(),
            confidence: score_match(matched_text, pattern.nutrient, unit_token.is_some()),
            is_estimated: caps.name("lt").is_some() || corrected.touches_correction(&range),
            source_range: range,
        },
        number.range(),
    ))
}

/// Whether the word right before `start` (same line) marks a sub-row label.
fn preceded_by_excluded(text: &str, start: usize, excluded: &[&str]) -> bool {
    if excluded.is_empty() {
        return false;
    }
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let previous_word = text[line_start..start]
        .split_whitespace()
        .next_back()
        .map(str::to_lowercase);
    match previous_word {
        Some(word) => excluded.iter().any(|stem| word.ends_with(stem)),
        None => false,
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

// ═══════════════════════════════════════════════════════════
// Serving info
// ═══════════════════════════════════════════════════════════

/// "Serving Size 1 cup (228g)" and "Servings Per Container 8".
fn parse_serving(text: &str) -> Option<ServingInfo> {
    let size = SERVING_SIZE.as_ref().and_then(|re| re.captures(text));
    let per_container = SERVINGS_PER_CONTAINER
        .as_ref()
        .and_then(|re| re.captures(text))
        .or_else(|| SERVINGS_VALUE_FIRST.as_ref().and_then(|re| re.captures(text)));

    if size.is_none() && per_container.is_none() {
        return None;
    }

    let servings_per_container = per_container
        .as_ref()
        .and_then(|caps| caps.name("num"))
        .and_then(|m| parse_number(m.as_str()));

    let (description, matched, amount, unit, grams) = match &size {
        Some(caps) => {
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            // Same row may continue with "Servings Per Container"
            let description = rest
                .to_ascii_lowercase()
                .find("servings")
                .map_or(rest, |i| &rest[..i])
                .trim()
                .to_string();
            let (amount, unit) = serving_amount(&description);
            let grams = serving_grams(&description).or_else(|| {
                let is_metric = unit.as_deref().is_some_and(|u| u == "g" || u == "ml");
                if is_metric {
                    amount
                } else {
                    None
                }
            });
            let matched = caps.get(0).map_or("", |m| m.as_str()).to_string();
            (description, matched, amount, unit, grams)
        }
        None => (String::new(), String::new(), None, None, None),
    };

    let matched_text = match &per_container {
        Some(caps) => format!("{matched} {}", caps.get(0).map_or("", |m| m.as_str())),
        None => matched,
    };
    let confidence = serving_confidence(&matched_text, unit.is_some() || grams.is_some());

    Some(ServingInfo {
        description,
        amount,
        unit,
        grams,
        servings_per_container,
        confidence,
    })
}

fn serving_amount(description: &str) -> (Option<f64>, Option<String>) {
    let Some(caps) = SERVING_AMOUNT.as_ref().and_then(|re| re.captures(description)) else {
        return (None, None);
    };
    let amount = caps.name("amount").and_then(|m| parse_number(m.as_str()));
    let unit = caps.name("unit").map(|m| m.as_str().to_lowercase());
    (amount, unit)
}

fn serving_grams(description: &str) -> Option<f64> {
    SERVING_GRAMS
        .as_ref()?
        .captures(description)
        .and_then(|caps| caps.name("num"))
        .and_then(|m| parse_number(m.as_str()))
}

/// Same rule as nutrient matches, with "serving" as the keyword.
fn serving_confidence(matched_text: &str, has_unit: bool) -> f32 {
    let mut score = MATCH_BASE;
    if matched_text.to_lowercase().contains("serving") {
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

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
