//! Small descriptive statistics over lap times

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Median of an ascending slice.
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Mean of an ascending slice after dropping `floor(n * fraction)` values from each end.
///
/// Returns `None` when nothing would be dropped, so callers can fall back to the median.
pub fn trimmed_mean_sorted(sorted: &[f64], fraction: f64) -> Option<f64> {
    let trim = (sorted.len() as f64 * fraction).floor() as usize;
    if trim == 0 || sorted.len() <= trim * 2 {
        return None;
    }
    mean(&sorted[trim..sorted.len() - trim])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(2.0));
    }

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median_sorted(&[1.0, 3.0, 9.0]), Some(3.0));
        assert_eq!(median_sorted(&[1.0, 3.0, 5.0, 9.0]), Some(4.0));
        assert_eq!(median_sorted(&[]), None);
    }

    #[test]
    fn trimmed_mean_drops_both_tails() {
        let mut values: Vec<f64> = (1..=9).map(f64::from).collect();
        values.push(1_000.0);
        // Ten values at 10%: drop 1.0 and 1000.0.
        assert_eq!(trimmed_mean_sorted(&values, 0.1), Some(5.5));
        assert_eq!(trimmed_mean_sorted(&values[..5], 0.1), None);
    }
}
