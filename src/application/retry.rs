use crate::config::EscrowConfig;
use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EscrowConfig) -> Self {
        Self {
            max_attempts: config.gateway_max_attempts.max(1),
            backoff_base: config.gateway_backoff_base,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt - 1)
    }
}

/// Runs a gateway call with bounded retries and exponential backoff.
///
/// Only `Retryable` failures are retried; `Terminal` failures and exhausted
/// attempts propagate to the caller unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    call = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retryable gateway failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
