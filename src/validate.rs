use crate::model::ValidationResult;

/// Tolerance of the accounting identity check. Fixed for the whole run;
/// callers never override it per row.
pub const BALANCE_TOLERANCE: f64 = 0.001;

/// Checks `end == begin + in - out` within [`BALANCE_TOLERANCE`].
///
/// The identity is only ever used to validate a closing balance, never to
/// derive one. Pure and total.
pub fn validate_balance(begin: f64, qty_in: f64, qty_out: f64, end: f64) -> ValidationResult {
    let expected = begin + qty_in - qty_out;
    let diff = (end - expected).abs();

    if diff <= BALANCE_TOLERANCE {
        ValidationResult {
            valid: true,
            diff,
            error: None,
        }
    } else {
        ValidationResult {
            valid: false,
            diff,
            error: Some(format!(
                "closing balance {} does not match {} + {} - {} (expected {}, diff {})",
                end, begin, qty_in, qty_out, expected, diff
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_identity_is_valid() {
        let result = validate_balance(10.0, 100.0, 30.0, 80.0);
        assert!(result.valid);
        assert_eq!(result.diff, 0.0);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_rounding_noise_within_tolerance() {
        let result = validate_balance(0.0, 0.1, 0.0, 0.1000004);
        assert!(result.valid);
    }

    #[test]
    fn test_mismatch_beyond_tolerance() {
        let result = validate_balance(0.0, 100.0, 0.0, 95.0);
        assert!(!result.valid);
        assert!((result.diff - 5.0).abs() < 1e-9);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_boundary_diff_equal_to_tolerance_is_valid() {
        let result = validate_balance(0.0, 1.0, 0.0, 1.0 + BALANCE_TOLERANCE);
        assert!(result.valid);
    }
}
