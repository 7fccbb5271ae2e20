use {
    std::{fmt::Display, future::Future, time::Duration},
    tokio::time::sleep,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Delay slept after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt cap is reached. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::warn!(attempt, error = %error, "non-retryable failure");
                    return Err(error);
                }
                if attempt >= max_attempts {
                    tracing::warn!(attempt, error = %error, "retry attempts exhausted");
                    return Err(error);
                }

                let delay = config.delay_after(attempt);
                tracing::warn!(attempt, ?delay, error = %error, "retryable failure, backing off");
                sleep(delay).await;
            }
        }
    }
}
