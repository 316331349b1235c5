//! Per-request cancellation and deadline handling
//!
//! Every store and cache call runs through [`RequestContext::run`]. When the
//! context is cancelled or its deadline passes, the in-flight future is dropped,
//! which returns the pooled connection, and the caller gets
//! [`CoreError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A context carrying the configured request deadline.
    pub fn for_request(settings: &Settings) -> Self {
        Self::with_timeout(Duration::from_secs(settings.request_timeout_seconds))
    }

    /// Derive a context cancelled together with `self`. The child keeps the
    /// earlier of the two deadlines.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let own = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `fut` unless the context is cancelled or times out first.
    pub async fn run<F, T>(&self, fut: F) -> CoreResult<T>
    where
        F: Future<Output = CoreResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(CoreError::Cancelled("request cancelled".to_string()));
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                tracing::debug!("Request cancelled while waiting on store");
                Err(CoreError::Cancelled("request cancelled".to_string()))
            }
            _ = deadline => {
                tracing::debug!("Request deadline exceeded");
                Err(CoreError::Cancelled("deadline exceeded".to_string()))
            }
            result = fut => result,
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn run_returns_inner_result() {
        let ctx = RequestContext::background();
        let value = ctx.run(async { Ok::<_, CoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let ctx = RequestContext::background();
        ctx.cancel();
        let result = ctx.run(async { Ok::<_, CoreError>(1) }).await;
        assert_matches!(result, Err(CoreError::Cancelled(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_slow_future() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(50));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, CoreError>(())
            })
            .await;
        assert_matches!(result, Err(CoreError::Cancelled(msg)) if msg.contains("deadline"));
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = RequestContext::background();
        let child = parent.child(None);
        parent.cancel();
        assert!(child.is_cancelled());
        let result = child.run(async { Ok::<_, CoreError>(()) }).await;
        assert_matches!(result, Err(CoreError::Cancelled(_)));
    }
}
