//! Instrumented fakes shared by the unit tests.

use crate::document::Page;
use crate::error::OcrError;
use crate::ocr::retry::Backoff;
use crate::ocr::OcrClient;
use crate::sink::OutputSink;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// OCR fake: page `i` returns `texts[i]` after failing a scripted number of times.
///
/// Tracks per-page call counts and the high-water mark of concurrent calls.
#[derive(Default)]
pub struct ScriptedOcr {
    texts: Vec<String>,
    failures: HashMap<usize, u32>,
    latency: HashMap<usize, Duration>,
    default_latency: Duration,
    calls: Mutex<HashMap<usize, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Page `index` fails its first `times` calls.
    pub fn fail_first(mut self, index: usize, times: u32) -> Self {
        self.failures.insert(index, times);
        self
    }

    /// Page `index` never succeeds.
    pub fn fail_always(self, index: usize) -> Self {
        self.fail_first(index, u32::MAX)
    }

    /// Every call holds its slot for `latency` (on the tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    pub fn with_page_latency(mut self, index: usize, latency: Duration) -> Self {
        self.latency.insert(index, latency);
        self
    }

    pub fn calls_for(&self, index: usize) -> u32 {
        self.calls.lock().unwrap().get(&index).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl OcrClient for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, page: &Page) -> Result<String, OcrError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(page.index).or_insert(0);
            *count += 1;
            *count
        };

        let latency = self
            .latency
            .get(&page.index)
            .copied()
            .unwrap_or(self.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail_count = self.failures.get(&page.index).copied().unwrap_or(0);
        if attempt <= fail_count {
            return Err(OcrError::Transport(format!(
                "page {} attempt {} refused",
                page.index, attempt
            )));
        }
        self.texts
            .get(page.index)
            .cloned()
            .ok_or_else(|| OcrError::Malformed(format!("no script for page {}", page.index)))
    }
}

/// Records every requested wait instead of sleeping.
#[derive(Default)]
pub struct RecordingBackoff {
    sleeps: Mutex<Vec<(usize, u32, Duration)>>,
}

impl RecordingBackoff {
    pub fn all(&self) -> Vec<(usize, u32, Duration)> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleeps_for(&self, index: usize) -> Vec<Duration> {
        self.all()
            .into_iter()
            .filter(|(i, _, _)| *i == index)
            .map(|(_, _, d)| d)
            .collect()
    }
}

#[async_trait::async_trait]
impl Backoff for RecordingBackoff {
    async fn wait(&self, page_index: usize, attempt: u32, delay: Duration) {
        self.sleeps.lock().unwrap().push((page_index, attempt, delay));
    }
}

/// In-memory [`OutputSink`] for driver tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, e.g. to simulate a previous run.
    pub fn insert(&self, name: &str, text: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), text.into());
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl OutputSink for MemorySink {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name))
    }

    async fn write(&self, name: &str, text: &str) -> Result<()> {
        self.insert(name, text);
        Ok(())
    }
}

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write("scan", "text").await.unwrap();
        assert!(sink.exists("scan").await.unwrap());
        assert_eq!(sink.get("scan").as_deref(), Some("text"));
        assert_eq!(sink.len(), 1);
    }
}
