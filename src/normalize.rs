//! Min-max normalization over a candidate set.

/// Normalizes `values` to `[0, 1]` by min-max scaling. When `max <= min` (all values
/// equal, or a single-element set), every output is `1.0` rather than dividing by zero.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max <= min {
        return vec![1.0; values.len()];
    }
    let span = max - min;
    values.iter().map(|v| (v - min) / span).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_unit_range() {
        let out = min_max_normalize(&[0.0, 5.0, 10.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn degenerate_all_equal_values_become_one() {
        let out = min_max_normalize(&[3.0, 3.0, 3.0]);
        assert_eq!(out, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn single_value_becomes_one() {
        let out = min_max_normalize(&[7.0]);
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let out = min_max_normalize(&[]);
        assert!(out.is_empty());
    }

    #[test]
    fn already_normalized_input_is_idempotent_when_max_gt_min() {
        let once = min_max_normalize(&[0.0, 0.5, 1.0]);
        let twice = min_max_normalize(&once);
        assert_eq!(once, twice);
    }
}
