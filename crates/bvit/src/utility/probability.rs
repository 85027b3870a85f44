//! # Probability Utilities

/// Check that a value is a valid probability.
///
/// # Arguments
///
/// - `prob`: the value to check.
///
/// # Returns
///
/// The value, unchanged.
///
/// # Panics
///
/// If `prob` is not in the range ``[0.0, 1.0]``.
#[inline(always)]
pub fn expect_probability(prob: f64) -> f64 {
    assert!(
        (0.0..=1.0).contains(&prob),
        "Expected a probability in [0.0, 1.0], got {prob}"
    );
    prob
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_probability() {
        assert_eq!(expect_probability(0.0), 0.0);
        assert_eq!(expect_probability(0.25), 0.25);
        assert_eq!(expect_probability(1.0), 1.0);
    }

    #[test]
    #[should_panic(expected = "Expected a probability in [0.0, 1.0], got 1.5")]
    fn test_expect_probability_panic() {
        expect_probability(1.5);
    }

    #[test]
    #[should_panic(expected = "got -0.1")]
    fn test_expect_probability_negative() {
        expect_probability(-0.1);
    }
}
