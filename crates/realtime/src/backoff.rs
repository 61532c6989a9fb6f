use std::time::Duration;

/// Exponential backoff: `min(base × factor^(attempt − 1), cap)`.
///
/// `attempt` is 1-based. Attempt 0 needs no delay and yields zero.
/// Deterministic, no jitter.
pub fn backoff_delay(attempt: u32, base: Duration, factor: f64, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let exp = attempt.saturating_sub(1).min(63) as i32;
    let ms = base.as_millis() as f64 * factor.powi(exp);
    let capped = ms.min(cap.as_millis() as f64).max(0.0);
    Duration::from_millis(capped.round() as u64)
}
