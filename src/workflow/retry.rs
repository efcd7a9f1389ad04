use std::future::Future;
use std::time::Duration;

/// Fixed attempt count with linear backoff (`backoff * attempt`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Single attempt, no waiting.
    #[cfg(test)]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Runs one workflow step, retrying on error until the policy is exhausted.
/// The last error is returned.
pub async fn run_step<T, F, Fut>(policy: RetryPolicy, step: &str, mut f: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("Step '{}' succeeded on attempt {}", step, attempt);
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts => {
                tracing::warn!(
                    "Step '{}' failed (attempt {}/{}): {:#}",
                    step,
                    attempt,
                    policy.max_attempts,
                    err
                );
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!("Step '{}' failed after {} attempt(s): {:#}", step, attempt, err);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = run_step(policy, "flaky", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(anyhow::anyhow!("transient {n}"))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: anyhow::Result<()> = run_step(policy, "broken", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("down"))
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
