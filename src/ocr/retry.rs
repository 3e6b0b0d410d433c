//! Fixed-delay retry around a single-attempt [`OcrClient`].

use super::OcrClient;
use crate::document::{Page, PageResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to call the endpoint per page, and how long to wait between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Constant between attempts; never grows.
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` of zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Suspends a page task between attempts without blocking its siblings.
#[async_trait::async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, page_index: usize, attempt: u32, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait::async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, _page_index: usize, _attempt: u32, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Turns transport/protocol errors into retries, and exhausted retries into
/// a [`PageResult::Failed`].
#[derive(Clone)]
pub struct RetryingOcrClient {
    inner: Arc<dyn OcrClient>,
    backoff: Arc<dyn Backoff>,
    policy: RetryPolicy,
}

impl RetryingOcrClient {
    pub fn new(inner: Arc<dyn OcrClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            backoff: Arc::new(TokioBackoff),
            policy,
        }
    }

    #[allow(dead_code)]
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Each attempt is independent; nothing from a failed attempt is kept.
    pub async fn extract_with_retry(&self, page: &Page) -> PageResult {
        let max = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match self.inner.extract(page).await {
                Ok(text) => {
                    debug!(
                        "Page {} extracted by {} on attempt {}/{} ({} chars)",
                        page.index,
                        self.inner.name(),
                        attempt,
                        max,
                        text.len()
                    );
                    return PageResult::Text(text);
                }
                Err(e) => {
                    warn!(
                        "OCR error on page {} (attempt {}/{}): {}",
                        page.index, attempt, max, e
                    );
                    if attempt >= max {
                        return PageResult::failed(attempt, e.to_string());
                    }
                    self.backoff
                        .wait(page.index, attempt, self.policy.delay)
                        .await;
                    attempt += 1;
                }
            }
        }
    }
}
