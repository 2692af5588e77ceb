use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a raced future did not produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The token was cancelled first.
    Cancelled,
    /// The deadline passed first.
    DeadlineElapsed,
}

/// Extension trait for making futures cancellable.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the cancellation token and an absolute
    /// deadline. Cancellation wins ties so teardown is never reported as a
    /// timeout.
    async fn or_cancel_until(
        self,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<Self::Output, Interrupted>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel_until(
        self,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(Interrupted::DeadlineElapsed),
            res = self => Ok(res),
        }
    }
}
