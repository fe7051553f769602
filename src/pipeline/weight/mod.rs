//! Weight readings from kitchen-scale displays and package labels.
//!
//! Two passes over the recognized fragments:
//! - contextual: a number sitting between a mode ("M") button and a count
//!   ("PCS") button is the display reading
//! - direct: per-fragment patterns ("354 g", "354:2", "Net Wt. 500")
//!
//! Candidates are validated in grams, deduplicated and ranked by
//! [`detector::WeightDetector`].

pub mod types;
pub mod decimal;
pub mod contextual;
pub mod direct;
pub mod detector;

pub use types::*;
pub use decimal::correct_decimal;
pub use detector::{deduplicate, is_valid_weight, WeightDetector};

use regex::Regex;

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping weight pattern that failed to compile");
            None
        }
    }
}

/// "2,5" → 2.5. Display and package numbers use either separator.
fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse().ok()
}
