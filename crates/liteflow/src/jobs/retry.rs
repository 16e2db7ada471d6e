pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Parse the configured backoff base. Anything that is not a positive finite
/// number falls back to the default.
pub fn parse_backoff_base(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_BACKOFF_BASE)
}

/// Delay before the next attempt: `floor(base ^ attempt_no)` seconds.
///
/// Large exponents saturate instead of overflowing; the caller adds the
/// delay to the current time with saturating arithmetic.
pub fn backoff_delay_secs(base: f64, attempt_no: i64) -> i64 {
    let attempt_no = attempt_no.max(1);
    let delay = base.powi(attempt_no.min(i32::MAX as i64) as i32).floor();
    if delay.is_finite() && delay < i64::MAX as f64 {
        delay as i64
    } else {
        i64::MAX
    }
}
