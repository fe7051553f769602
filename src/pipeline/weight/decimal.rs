//! Implied-decimal correction for scale readings.
//!
//! Seven-segment displays are often read without their decimal point: a
//! display showing "35.4" comes back as "354". Unitless integer readings are
//! reinterpreted with one decimal place using a digit-count table.
//!
//! This is a tuned policy table, lossy by construction. A genuine "354 g"
//! reading without a unit becomes 35.4. Keep the rows and their order as is.

use std::ops::RangeInclusive;

struct DigitRule {
    digits: usize,
    range: RangeInclusive<f64>,
    divisor: f64,
}

/// Checked in order; the first row whose digit count and range both match
/// applies.
const DIGIT_RULES: [DigitRule; 4] = [
    DigitRule { digits: 2, range: 10.0..=99.0, divisor: 10.0 },
    DigitRule { digits: 3, range: 100.0..=999.0, divisor: 10.0 },
    DigitRule { digits: 4, range: 1_000.0..=9_999.0, divisor: 10.0 },
    DigitRule { digits: 5, range: 10_000.0..=99_999.0, divisor: 10.0 },
];

/// Integers here that no digit rule corrected are still treated as missing
/// their decimal point.
const SUSPECT_RANGE: RangeInclusive<f64> = 500.0..=50_000.0;
const SUSPECT_DIVISOR: f64 = 10.0;

/// Apply the correction table to a raw reading.
///
/// Non-integers and 0 are returned unchanged, as are single-digit integers
/// (already within the plausible 0.1..=50 band) and anything the table does
/// not cover.
pub fn correct_decimal(value: f64) -> f64 {
    if !value.is_finite() || value == 0.0 || value.fract() != 0.0 {
        return value;
    }

    let digits = digit_count(value);
    if let Some(rule) = DIGIT_RULES
        .iter()
        .find(|rule| rule.digits == digits && rule.range.contains(&value))
    {
        return value / rule.divisor;
    }

    if SUSPECT_RANGE.contains(&value) {
        return value / SUSPECT_DIVISOR;
    }
    value
}

fn digit_count(value: f64) -> usize {
    (value.abs() as u64).to_string().len()
}
