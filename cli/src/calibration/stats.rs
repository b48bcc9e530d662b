//! Small descriptive statistics over power readings (µW).

use std::time::Duration;

pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: i128 = values.iter().map(|&v| i128::from(v)).sum();
    sum as f64 / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Zero for fewer than two
/// values.
pub fn std_dev(values: &[i64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Upper median, matching `sorted[len / 2]`.
pub fn median(values: &[Duration]) -> Option<Duration> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2, 4, 4, 4, 5, 5, 7, 9];
        assert_eq!(mean(&values), 5.0);
        // Sample variance is 32 / 7.
        assert!((std_dev(&values) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[42]), 0.0);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mean_does_not_overflow() {
        assert_eq!(mean(&[i64::MAX, i64::MAX]), i64::MAX as f64);
    }

    #[test]
    fn test_median_picks_upper_middle() {
        let ms = |v: u64| Duration::from_millis(v);
        assert_eq!(median(&[ms(300), ms(100), ms(200)]), Some(ms(200)));
        assert_eq!(median(&[ms(400), ms(100), ms(300), ms(200)]), Some(ms(300)));
    }
}
