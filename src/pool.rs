//! Bounded fan-out of page extractions for one document.

use crate::document::{Page, PageResult};
use crate::ocr::retry::RetryingOcrClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Runs one retrying extraction per page, at most `concurrency` at a time.
///
/// A page failure never cancels its siblings; the pool always waits for
/// every task before returning.
#[derive(Clone)]
pub struct PageWorkerPool {
    client: RetryingOcrClient,
    concurrency: usize,
}

impl PageWorkerPool {
    /// `concurrency` of zero is treated as one (strictly sequential).
    pub fn new(client: RetryingOcrClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Every input page index appears exactly once in the returned map.
    pub async fn process_document(&self, name: &str, pages: Vec<Page>) -> BTreeMap<usize, PageResult> {
        let total = pages.len();
        let indices: Vec<usize> = pages.iter().map(|p| p.index).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(
            "OCR {}: dispatching {} pages (concurrency {})",
            name, total, self.concurrency
        );

        for page in pages {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            tasks.spawn(async move {
                // Only fails if the semaphore is closed, which this one never is.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (page.index, PageResult::failed(0, "worker pool closed")),
                };
                let result = client.extract_with_retry(&page).await;
                (page.index, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    results.insert(index, result);
                    debug!("OCR {}: {}/{} pages done (page {})", name, results.len(), total, index);
                }
                Err(e) => {
                    error!("OCR {}: page worker aborted: {}", name, e);
                }
            }
        }

        // A panicked task loses its index; fill the gap so the map stays complete.
        for index in indices {
            results
                .entry(index)
                .or_insert_with(|| PageResult::failed(0, "page worker aborted"));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::retry::RetryPolicy;
    use crate::testing::{RecordingBackoff, ScriptedOcr};
    use std::time::Duration;

    fn pages(n: usize) -> Vec<Page> {
        (0..n).map(|i| Page::new(i, vec![i as u8])).collect()
    }

    fn pool(ocr: &Arc<ScriptedOcr>, concurrency: usize) -> PageWorkerPool {
        let client = RetryingOcrClient::new(ocr.clone(), RetryPolicy::new(3, Duration::from_secs(5)))
            .with_backoff(Arc::new(RecordingBackoff::default()));
        PageWorkerPool::new(client, concurrency)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let texts: Vec<String> = (0..12).map(|i| format!("p{}", i)).collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let ocr = Arc::new(ScriptedOcr::new(&texts).with_latency(Duration::from_millis(100)));

        let results = pool(&ocr, 3).process_document("doc", pages(12)).await;

        assert_eq!(results.len(), 12);
        assert!(ocr.max_in_flight() <= 3);
        // With twelve slow pages the limit is actually reached
        assert_eq!(ocr.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_one_is_sequential() {
        let ocr = Arc::new(ScriptedOcr::new(&["a", "b", "c", "d"]).with_latency(Duration::from_millis(50)));

        let results = pool(&ocr, 1).process_document("doc", pages(4)).await;

        assert_eq!(results.len(), 4);
        assert_eq!(ocr.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_cancel_siblings() {
        // Page 1 fails fast; page 2 is slow and must still complete
        let ocr = Arc::new(
            ScriptedOcr::new(&["a", "b", "c"])
                .fail_always(1)
                .with_page_latency(2, Duration::from_secs(30)),
        );

        let results = pool(&ocr, 3).process_document("doc", pages(3)).await;

        assert_eq!(results[&0], PageResult::Text("a".to_string()));
        assert!(matches!(results[&1], PageResult::Failed(ref f) if f.attempts == 3));
        assert_eq!(results[&2], PageResult::Text("c".to_string()));
        assert_eq!(ocr.calls_for(2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keyed_by_index_not_completion() {
        // Earlier pages finish last
        let ocr = Arc::new(
            ScriptedOcr::new(&["first", "second", "third"])
                .with_page_latency(0, Duration::from_millis(300))
                .with_page_latency(1, Duration::from_millis(200))
                .with_page_latency(2, Duration::from_millis(100)),
        );

        let results = pool(&ocr, 3).process_document("doc", pages(3)).await;

        let texts: Vec<_> = results.into_values().collect();
        assert_eq!(
            texts,
            vec![
                PageResult::Text("first".to_string()),
                PageResult::Text("second".to_string()),
                PageResult::Text("third".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_document() {
        let ocr = Arc::new(ScriptedOcr::new(&[]));
        let results = pool(&ocr, 2).process_document("empty", Vec::new()).await;
        assert!(results.is_empty());
        assert_eq!(ocr.total_calls(), 0);
    }

    #[test]
    fn test_zero_concurrency_is_one() {
        let ocr = Arc::new(ScriptedOcr::new(&[]));
        assert_eq!(pool(&ocr, 0).concurrency(), 1);
    }
}
