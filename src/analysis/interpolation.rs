use crate::models::reference::ReferencePoint;

/// Round to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Map a measured value onto the percentile scale described by `points`.
///
/// `points` must be sorted by value (an invariant of reference data). Values at or
/// beyond either end clamp to that end's percentile; values in between are linearly
/// interpolated between the bracketing pair and rounded to 2 decimals.
/// Returns `None` for an empty table or a non-finite value.
pub fn interpolate_percentile(value: f64, points: &[ReferencePoint]) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let first = points.first()?;
    let last = points.last()?;

    if value <= first.value {
        return Some(first.percentile);
    }
    if value >= last.value {
        return Some(last.percentile);
    }

    for pair in points.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if lower.value <= value && value <= upper.value {
            if value == lower.value {
                return Some(lower.percentile);
            }
            let span = upper.value - lower.value;
            if span <= f64::EPSILON {
                return Some(lower.percentile);
            }
            let fraction = (value - lower.value) / span;
            return Some(round2(
                lower.percentile + fraction * (upper.percentile - lower.percentile),
            ));
        }
    }

    // Only reachable when `points` is not value-sorted.
    None
}
