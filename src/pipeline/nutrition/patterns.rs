//! Pattern tables for nutrition labels.
//!
//! Every nutrient has two forms, tried against the whole linearized text:
//! - label-first: "Calories: 250", "Total Fat 5g", "Sodium <5mg"
//! - value-first: "250 calories", "12g protein"
//!
//! Separators are `[ \t]`, never `\s`, so a match cannot span two label rows.
//! Patterns are compiled once. A pattern that fails to compile is logged and
//! left out; the remaining patterns still run.

use std::sync::LazyLock;

use regex::Regex;

use super::types::NutrientType;

/// Unit tokens, longest first so "mg" is not read as "g".
const UNITS: &str = r"kcal|kj|mcg|µg|ug|mg|g|iu|cal";

const NUMBER: &str = r"(?P<lt><[ \t]*|less[ \t]+than[ \t]+)?(?P<num>\d+(?:[.,]\d+)?)";

/// Label alternation per nutrient, plus words that, when they immediately
/// precede the label, mean the label belongs to another row
/// ("Saturated Fat" is not "Fat", "Added Sugars" is not "Sugars").
const NUTRIENT_LABELS: &[(NutrientType, &str, &[&str])] = &[
    (NutrientType::Calories, r"calories|calorie|energy", &[]),
    (NutrientType::Protein, r"proteins?", &[]),
    (
        NutrientType::Carbohydrates,
        r"total[ \t]+carbohydrates?|carbohydrates?|total[ \t]+carbs?|carbs?",
        &[],
    ),
    (
        NutrientType::Fat,
        r"total[ \t]+fat|fat",
        &["saturated", "sat", "sat.", "trans", "from"],
    ),
    (NutrientType::Fiber, r"dietary[ \t]+fib(?:er|re)|fib(?:er|re)", &[]),
    (NutrientType::Sugar, r"total[ \t]+sugars?|sugars?", &["added"]),
    (
        NutrientType::SaturatedFat,
        r"saturated[ \t]+fat|sat\.?[ \t]+fat|saturates",
        &[],
    ),
    (NutrientType::TransFat, r"trans[ \t]+fat", &[]),
    (NutrientType::Sodium, r"sodium", &[]),
    (NutrientType::Cholesterol, r"cholesterol", &[]),
    (NutrientType::Potassium, r"potassium", &[]),
    (NutrientType::Calcium, r"calcium", &[]),
    (NutrientType::Iron, r"iron", &[]),
    (NutrientType::VitaminA, r"vitamin[ \t]*a", &[]),
    (NutrientType::VitaminC, r"vitamin[ \t]*c", &[]),
    (NutrientType::VitaminD, r"vitamin[ \t]*d", &[]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternForm {
    LabelFirst,
    ValueFirst,
}

pub(crate) struct NutrientPattern {
    pub nutrient: NutrientType,
    pub form: PatternForm,
    pub regex: Regex,
    pub excluded_prefixes: &'static [&'static str],
}

/// Label-first patterns, one per nutrient, in table order.
pub(crate) static LABEL_FIRST_PATTERNS: LazyLock<Vec<NutrientPattern>> = LazyLock::new(|| {
    NUTRIENT_LABELS
        .iter()
        .filter_map(|(nutrient, labels, excluded)| {
            let pattern = format!(
                r"(?i)\b(?:{labels})\b[ \t]*[:\-.]?[ \t]*{NUMBER}(?:[ \t]*(?P<unit>{UNITS})\b)?(?P<pct>[ \t]*%)?"
            );
            Some(NutrientPattern {
                nutrient: *nutrient,
                form: PatternForm::LabelFirst,
                regex: compile(&pattern)?,
                excluded_prefixes: excluded,
            })
        })
        .collect()
});

/// Value-first patterns, one per nutrient, in table order.
pub(crate) static VALUE_FIRST_PATTERNS: LazyLock<Vec<NutrientPattern>> = LazyLock::new(|| {
    NUTRIENT_LABELS
        .iter()
        .filter_map(|(nutrient, labels, excluded)| {
            let pattern = format!(
                r"(?i){NUMBER}(?:[ \t]*(?P<unit>{UNITS})\b)?[ \t]*(?:{labels})\b"
            );
            Some(NutrientPattern {
                nutrient: *nutrient,
                form: PatternForm::ValueFirst,
                regex: compile(&pattern)?,
                excluded_prefixes: excluded,
            })
        })
        .collect()
});

// ── Serving & format ──────────────────────────────────────

pub(crate) static SERVING_SIZE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\bserving[ \t]+size\b[ \t]*:?[ \t]*(?P<rest>[^\n]*)"));

pub(crate) static SERVINGS_PER_CONTAINER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\bservings?[ \t]+per[ \t]+(?:container|package|pack)\b[ \t]*:?[ \t]*(?:about[ \t]+)?(?P<num>\d+(?:[.,]\d+)?)",
    )
});

pub(crate) static SERVINGS_VALUE_FIRST: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(?P<num>\d+(?:[.,]\d+)?)[ \t]+servings[ \t]+per[ \t]+(?:container|package|pack)\b")
});

/// Leading amount of a serving description: "1 cup", "1/2 bar", "30g".
pub(crate) static SERVING_AMOUNT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"^(?P<amount>\d+(?:[.,]\d+)?(?:/\d+)?)[ \t]*(?P<unit>[a-zA-Z]+)?")
});

/// Parenthesized metric equivalent: "(228g)", "(240 mL)".
pub(crate) static SERVING_GRAMS: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\((?P<num>\d+(?:[.,]\d+)?)[ \t]*(?P<unit>g|ml)\)"));

/// Label header or %DV column: evidence the text is a nutrition panel.
pub(crate) static PANEL_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)nutrition[ \t]+(?:facts|information|info)\b|%[ \t]*daily[ \t]+value|\bdaily[ \t]+value")
});

// ── Helpers ───────────────────────────────────────────────

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping nutrition pattern that failed to compile");
            None
        }
    }
}

/// Parse a label number: "2,5" → 2.5, "1,200" → 1200, "1/2" → 0.5.
pub(crate) fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = parse_number(num)?;
        let den: f64 = parse_number(den)?;
        return (den != 0.0).then(|| num / den);
    }
    if let Some((whole, frac)) = raw.split_once(',') {
        // Thousands separator when exactly three digits follow
        let normalized = if frac.len() == 3 {
            format!("{whole}{frac}")
        } else {
            format!("{whole}.{frac}")
        };
        return normalized.parse().ok();
    }
    raw.parse().ok()
}

/// Lowercase unit with micro-gram spellings folded to "mcg".
pub(crate) fn canonical_unit(token: &str) -> String {
    match token.to_lowercase().as_str() {
        "µg" | "ug" => "mcg".to_string(),
        other => other.to_string(),
    }
}

/// Single-word label alternatives, with `s?` and `(?:er|re)` expanded.
#[cfg(test)]
pub(crate) fn single_word_labels() -> Vec<String> {
    NUTRIENT_LABELS
        .iter()
        .flat_map(|(_, labels, _)| labels.split('|'))
        .filter(|alt| !alt.contains(r"[ \t]") && !alt.contains(r"\."))
        .flat_map(|alt| match alt.strip_suffix("s?") {
            Some(stem) => vec![stem.to_string(), format!("{stem}s")],
            None => vec![alt.to_string()],
        })
        .flat_map(|alt| match alt.split_once("(?:er|re)") {
            Some((head, tail)) => vec![format!("{head}er{tail}"), format!("{head}re{tail}")],
            None => vec![alt],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(LABEL_FIRST_PATTERNS.len(), NUTRIENT_LABELS.len());
        assert_eq!(VALUE_FIRST_PATTERNS.len(), NUTRIENT_LABELS.len());
        assert!(SERVING_SIZE.is_some());
        assert!(SERVINGS_PER_CONTAINER.is_some());
        assert!(SERVINGS_VALUE_FIRST.is_some());
        assert!(SERVING_AMOUNT.is_some());
        assert!(SERVING_GRAMS.is_some());
        assert!(PANEL_MARKER.is_some());
    }

    #[test]
    fn single_word_labels_expanded() {
        let labels = single_word_labels();
        for expected in ["calories", "protein", "proteins", "fiber", "fibre", "saturates", "iron"] {
            assert!(labels.iter().any(|l| l == expected), "{expected} missing");
        }
        assert!(labels.iter().all(|l| !l.contains('?') && !l.contains('[')));
    }

    #[test]
    fn every_nutrient_has_a_label_pattern() {
        for n in NutrientType::ALL {
            assert!(
                LABEL_FIRST_PATTERNS.iter().any(|p| p.nutrient == n),
                "{n} has no pattern"
            );
        }
    }

    fn label_first(n: NutrientType) -> &'static Regex {
        &LABEL_FIRST_PATTERNS
            .iter()
            .find(|p| p.nutrient == n)
            .unwrap()
            .regex
    }

    #[test]
    fn label_first_captures_number_and_unit() {
        let caps = label_first(NutrientType::Sodium).captures("Sodium 140mg").unwrap();
        assert_eq!(&caps["num"], "140");
        assert_eq!(&caps["unit"], "mg");

        let caps = label_first(NutrientType::Calories).captures("Calories: 250").unwrap();
        assert_eq!(&caps["num"], "250");
        assert!(caps.name("unit").is_none());
    }

    #[test]
    fn unit_alternation_prefers_longest() {
        let caps = label_first(NutrientType::VitaminD).captures("Vitamin D 2mcg").unwrap();
        assert_eq!(&caps["unit"], "mcg");
        let caps = label_first(NutrientType::Calories).captures("Energy 250 kcal").unwrap();
        assert_eq!(&caps["unit"], "kcal");
    }

    #[test]
    fn cal_unit_needs_word_boundary() {
        let value_first = &VALUE_FIRST_PATTERNS
            .iter()
            .find(|p| p.nutrient == NutrientType::Calories)
            .unwrap()
            .regex;
        let caps = value_first.captures("250 calories").unwrap();
        assert_eq!(&caps["num"], "250");
        assert!(caps.name("unit").is_none());
    }

    #[test]
    fn percent_column_is_flagged() {
        let caps = label_first(NutrientType::Calcium).captures("Calcium 20%").unwrap();
        assert!(caps.name("pct").is_some());
    }

    #[test]
    fn less_than_prefix_captured() {
        let caps = label_first(NutrientType::TransFat).captures("Trans Fat <1g").unwrap();
        assert!(caps.name("lt").is_some());
        assert_eq!(&caps["num"], "1");
    }

    #[test]
    fn patterns_do_not_cross_rows() {
        assert!(label_first(NutrientType::Protein).captures("Protein\n12g").is_none());
    }

    #[test]
    fn panel_marker_variants() {
        let re = PANEL_MARKER.as_ref().unwrap();
        assert!(re.is_match("Nutrition Facts"));
        assert!(re.is_match("NUTRITION INFORMATION"));
        assert!(re.is_match("% Daily Value*"));
        assert!(!re.is_match("Ingredients: water"));
    }

    #[test]
    fn parse_number_variants() {
        assert_eq!(parse_number("250"), Some(250.0));
        assert_eq!(parse_number("2.5"), Some(2.5));
        assert_eq!(parse_number("2,5"), Some(2.5));
        assert_eq!(parse_number("1,200"), Some(1200.0));
        assert_eq!(parse_number("1/2"), Some(0.5));
        assert_eq!(parse_number("1/0"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn canonical_units() {
        assert_eq!(canonical_unit("MG"), "mg");
        assert_eq!(canonical_unit("µg"), "mcg");
        assert_eq!(canonical_unit("ug"), "mcg");
        assert_eq!(canonical_unit("Kcal"), "kcal");
    }
}
