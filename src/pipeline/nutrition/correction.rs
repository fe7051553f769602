//! Post-OCR nutrient keyword correction.
//!
//! Rewrites near-miss label words ("Protien", "Sodlum", "Calorles") to the
//! dictionary spelling before pattern matching. Only corrects when the word is
//! at least 5 characters, within edit distance 2 of exactly one term, and not
//! already a known term.

use std::ops::Range;

/// Label vocabulary. Sorted for binary search, lowercase.
/// Every single-word label the pattern tables accept must be listed, or a
/// valid label gets rewritten into a neighbouring one.
const NUTRITION_TERMS: &[&str] = &[
    "calcium", "calorie", "calories", "carbohydrate", "carbohydrates", "carbs",
    "cholesterol", "container", "dietary", "energy", "fiber", "fibre", "information",
    "nutrition", "potassium", "protein", "proteins", "saturated", "saturates", "serving",
    "servings", "sodium", "sugar", "sugars", "vitamin",
];

const MIN_WORD_LEN: usize = 5;
const MAX_DISTANCE: usize = 2;

/// Text after correction, with the byte ranges (in the new text) of every
/// rewritten word.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedText {
    pub text: String,
    pub corrections: Vec<Range<usize>>,
}

impl CorrectedText {
    /// Whether `range` overlaps a corrected word.
    pub fn touches_correction(&self, range: &Range<usize>) -> bool {
        self.corrections
            .iter()
            .any(|c| c.start < range.end && range.start < c.end)
    }
}

/// Apply keyword correction word by word, keeping all separators.
pub fn correct_keywords(text: &str) -> CorrectedText {
    let mut result = String::with_capacity(text.len());
    let mut corrections = Vec::new();
    let mut word = String::new();

    let mut flush = |word: &mut String, result: &mut String| {
        if word.is_empty() {
            return;
        }
        match try_correct_word(word) {
            Some(fixed) => {
                let start = result.len();
                result.push_str(&fixed);
                corrections.push(start..result.len());
            }
            None => result.push_str(word),
        }
        word.clear();
    };

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            word.push(ch);
        } else {
            flush(&mut word, &mut result);
            result.push(ch);
        }
    }
    flush(&mut word, &mut result);

    CorrectedText {
        text: result,
        corrections,
    }
}

/// `Some(corrected)` only for an unambiguous near-miss.
fn try_correct_word(word: &str) -> Option<String> {
    if word.chars().count() < MIN_WORD_LEN || word.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let lower = word.to_lowercase();
    if NUTRITION_TERMS.binary_search(&lower.as_str()).is_ok() {
        return None;
    }

    let mut best: Option<&str> = None;
    let mut best_distance = MAX_DISTANCE + 1;
    let mut ambiguous = false;

    for &term in NUTRITION_TERMS {
        if lower.len().abs_diff(term.len()) > MAX_DISTANCE {
            continue;
        }
        let distance = strsim::levenshtein(&lower, term);
        if distance < best_distance {
            best_distance = distance;
            best = Some(term);
            ambiguous = false;
        } else if distance == best_distance && best.is_some() {
            ambiguous = true;
        }
    }

    match best {
        Some(term) if !ambiguous => Some(preserve_case(word, term)),
        _ => None,
    }
}

/// Carry the original capitalization pattern over to the correction.
fn preserve_case(original: &str, correction: &str) -> String {
    if original.chars().all(|c| c.is_uppercase() || !c.is_alphabetic()) {
        return correction.to_uppercase();
    }

    let first_upper = original.chars().next().is_some_and(|c| c.is_uppercase());
    let mut chars = correction.chars();
    match chars.next() {
        Some(c) if first_upper => c.to_uppercase().chain(chars).collect(),
        _ => correction.to_string(),
    }
}
