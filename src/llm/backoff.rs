use rand::Rng;
use std::time::Duration;

/// Exponential backoff with ±30% jitter: `base * 2^attempt`, exponent capped at 10.
pub fn calculate_backoff_delay(attempt: u32, base_delay: Duration) -> Duration {
    let capped_attempt = attempt.min(10);
    let base_ms = base_delay.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(capped_attempt));

    let jitter_factor = rand::thread_rng().gen_range(0.7..1.3);
    Duration::from_millis((delay_ms as f64 * jitter_factor).round() as u64)
}
