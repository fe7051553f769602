//! Row-major reading order over recognized fragments.
//!
//! Fragments are grouped into rows by vertical center, then read left to right.
//! A row is anchored on its topmost fragment: a fragment joins the row when its
//! center lies within [`ROW_TOLERANCE`] of the anchor's. Anchoring (instead of
//! chaining neighbour to neighbour) keeps fragments that are more than the
//! tolerance apart vertically in their top-to-bottom order.

use super::types::TextFragment;

/// Max vertical center distance (normalized) for two fragments to share a row.
pub const ROW_TOLERANCE: f32 = 0.05;

/// Group fragments into rows, top to bottom, each row sorted left to right.
pub fn group_rows(fragments: &[TextFragment]) -> Vec<Vec<&TextFragment>> {
    let mut by_height: Vec<&TextFragment> = fragments.iter().collect();
    by_height.sort_by(|a, b| {
        a.bounding_box
            .mid_y()
            .total_cmp(&b.bounding_box.mid_y())
            .then(a.bounding_box.min_x().total_cmp(&b.bounding_box.min_x()))
    });

    let mut rows: Vec<Vec<&TextFragment>> = Vec::new();
    let mut anchor_y = f32::NEG_INFINITY;

    for fragment in by_height {
        let y = fragment.bounding_box.mid_y();
        match rows.last_mut() {
            Some(row) if y - anchor_y <= ROW_TOLERANCE => row.push(fragment),
            _ => {
                anchor_y = y;
                rows.push(vec![fragment]);
            }
        }
    }

    for row in &mut rows {
        row.sort_by(|a, b| a.bounding_box.min_x().total_cmp(&b.bounding_box.min_x()));
    }
    rows
}

/// Fragments flattened in reading order.
pub fn sort_reading_order(fragments: &[TextFragment]) -> Vec<&TextFragment> {
    group_rows(fragments).into_iter().flatten().collect()
}

/// Join fragments into one text: a space between fragments of a row,
/// a newline between rows. Blank fragments are skipped.
pub fn linearize(fragments: &[TextFragment]) -> String {
    group_rows(fragments)
        .iter()
        .map(|row| {
            row.iter()
                .map(|f| f.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
