//! Timeout normalization.
//!
//! Accepts "90s", "10m" or "5h" and canonicalizes to whole seconds ("600s").

use crate::{Error, Result};

/// Parse a timeout string into whole seconds.
///
/// The prefix must be a non-negative integer and the suffix one of `s`, `m`
/// or `h`. The result must fit in a Kubernetes int64 (`activeDeadlineSeconds`).
pub fn timeout_seconds(timeout: &str) -> Result<u64> {
    let timeout = timeout.trim();
    let invalid = || Error::invalid_timeout(timeout);

    let (digits, multiplier) = if let Some(n) = timeout.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = timeout.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = timeout.strip_suffix('h') {
        (n, 60 * 60)
    } else {
        return Err(invalid());
    };

    // u64::from_str accepts a leading '+', which we don't
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .filter(|&n| n <= i64::MAX as u64)
        .ok_or_else(invalid)
}

/// Normalize a timeout string to `<seconds>s`.
///
/// Input already in seconds is returned unchanged (after trimming).
pub fn normalize_timeout(timeout: &str) -> Result<String> {
    let trimmed = timeout.trim();
    let seconds = timeout_seconds(trimmed)?;
    if trimmed.ends_with('s') {
        return Ok(trimmed.to_string());
    }
    Ok(format!("{seconds}s"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::minutes("10m", "600s")]
    #[case::one_minute("1m", "60s")]
    #[case::hours("5h", "18000s")]
    #[case::seconds_unchanged("100s", "100s")]
    #[case::zero("0m", "0s")]
    #[case::whitespace(" 2h ", "7200s")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_timeout(input).unwrap(), expected);
    }

    #[test]
    fn minutes_and_hours_scale_for_any_n() {
        for n in [0u64, 1, 7, 59, 60, 1440, 100_000] {
            assert_eq!(normalize_timeout(&format!("{n}m")).unwrap(), format!("{}s", n * 60));
            assert_eq!(normalize_timeout(&format!("{n}h")).unwrap(), format!("{}s", n * 3600));
            assert_eq!(normalize_timeout(&format!("{n}s")).unwrap(), format!("{n}s"));
        }
    }

    #[rstest]
    #[case::days("10d")]
    #[case::no_suffix("600")]
    #[case::empty("")]
    #[case::suffix_only("m")]
    #[case::non_numeric("tenm")]
    #[case::fractional("1.5h")]
    #[case::negative("-5m")]
    #[case::plus_sign("+5m")]
    #[case::uppercase("5H")]
    #[case::above_int64("9223372036854775808s")]
    #[case::hours_above_int64("2562047788015216h")]
    fn rejects(#[case] input: &str) {
        let err = normalize_timeout(input).unwrap_err();
        assert!(matches!(err, Error::InvalidTimeoutFormat { .. }), "{err}");
    }

    #[test]
    fn overflow_is_rejected() {
        let huge = format!("{}h", u64::MAX);
        assert!(matches!(
            timeout_seconds(&huge),
            Err(Error::InvalidTimeoutFormat { .. })
        ));
    }

    #[test]
    fn int64_max_is_the_upper_bound() {
        assert_eq!(
            timeout_seconds("9223372036854775807s").unwrap(),
            i64::MAX as u64
        );
    }

    #[test]
    fn timeout_seconds_returns_number() {
        assert_eq!(timeout_seconds("10m").unwrap(), 600);
        assert_eq!(timeout_seconds("45s").unwrap(), 45);
    }
}
