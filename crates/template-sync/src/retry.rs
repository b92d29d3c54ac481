use std::future::Future;
use std::time::Duration;

/// Bounded-attempt retry with a fixed delay between attempts.
///
/// Providers use this for downloads and reads where the failure mode is a
/// network blip or a sharing violation; the caller classifies which errors
/// are worth retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `operation`, retrying errors for which `is_transient` returns
    /// true until the attempt budget is spent. The last error is returned
    /// unchanged.
    pub async fn run<T, E, Fut>(
        &self,
        mut operation: impl FnMut() -> Fut,
        is_transient: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.attempts && is_transient(&error) => {
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
