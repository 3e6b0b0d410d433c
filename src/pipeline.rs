//! Per-document driver: resumability check, fan-out, assembly, persistence.

use crate::assembler::assemble;
use crate::config::PipelineConfig;
use crate::document::{Document, DocumentResult};
use crate::ocr::retry::RetryingOcrClient;
use crate::ocr::OcrClient;
use crate::pool::PageWorkerPool;
use crate::sink::OutputSink;
use crate::source::PageSource;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Terminal state of one document in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Output already existed; the OCR service was not contacted.
    Skipped { name: String },
    Written { name: String, pages: usize, bytes: usize },
    /// Nothing was written; the document is retried on the next run.
    Failed {
        name: String,
        page_index: Option<usize>,
        reason: String,
    },
}

impl DocumentOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Skipped { name } | Self::Written { name, .. } | Self::Failed { name, .. } => name,
        }
    }
}

/// Tally of a run, plus every outcome in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<DocumentOutcome>,
}

impl RunSummary {
    fn record(&mut self, outcome: DocumentOutcome) {
        match outcome {
            DocumentOutcome::Skipped { .. } => self.skipped += 1,
            DocumentOutcome::Written { .. } => self.written += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Processes documents one at a time; pages within a document run in the pool.
pub struct PipelineDriver {
    pool: PageWorkerPool,
    sink: Arc<dyn OutputSink>,
}

impl PipelineDriver {
    pub fn new(pool: PageWorkerPool, sink: Arc<dyn OutputSink>) -> Self {
        Self { pool, sink }
    }

    /// Wire retry policy and concurrency from `config` around `client`.
    pub fn from_config(
        config: &PipelineConfig,
        client: Arc<dyn OcrClient>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let retrying = RetryingOcrClient::new(client, config.retry_policy());
        Self::new(PageWorkerPool::new(retrying, config.concurrency), sink)
    }

    /// Run over already-loaded documents, in order.
    #[allow(dead_code)]
    pub async fn run(&self, documents: Vec<Document>) -> RunSummary {
        let mut summary = RunSummary::default();
        for document in documents {
            let name = document.name.clone();
            let outcome = self.run_one(name, async { Ok(document) }).await;
            summary.record(outcome);
        }
        self.log_summary(&summary);
        summary
    }

    /// Run over every document a source lists. Pages are only loaded for
    /// documents that still need processing.
    pub async fn run_source(&self, source: &dyn PageSource) -> Result<RunSummary> {
        let names = source.documents().await?;
        info!("Found {} documents", names.len());

        let mut summary = RunSummary::default();
        for name in names {
            let load = source.load(&name);
            let outcome = self.run_one(name.clone(), load).await;
            summary.record(outcome);
        }
        self.log_summary(&summary);
        Ok(summary)
    }

    /// One document: skip if already written, otherwise load its pages and process.
    /// `load` is only awaited when the document still needs work.
    async fn run_one(
        &self,
        name: String,
        load: impl Future<Output = Result<Document>>,
    ) -> DocumentOutcome {
        if let Some(outcome) = self.check_done(&name).await {
            return outcome;
        }
        match load.await {
            Ok(document) => self.process(document).await,
            Err(e) => {
                error!("Skipping {}: could not load pages: {:#}", name, e);
                DocumentOutcome::Failed {
                    name,
                    page_index: None,
                    reason: format!("{:#}", e),
                }
            }
        }
    }

    /// `Some(outcome)` if the document must not be processed now.
    async fn check_done(&self, name: &str) -> Option<DocumentOutcome> {
        match self.sink.exists(name).await {
            Ok(true) => {
                info!("Skipping {}, already processed.", name);
                Some(DocumentOutcome::Skipped {
                    name: name.to_string(),
                })
            }
            Ok(false) => None,
            Err(e) => {
                error!("Skipping {}: could not check existing output: {:#}", name, e);
                Some(DocumentOutcome::Failed {
                    name: name.to_string(),
                    page_index: None,
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    /// Pool, then assemble, then write only if every page succeeded.
    pub async fn process(&self, document: Document) -> DocumentOutcome {
        let Document { name, pages } = document;
        let page_count = pages.len();
        if page_count == 0 {
            warn!("{} has no pages", name);
        }

        let results = self.pool.process_document(&name, pages).await;

        match assemble(page_count, results) {
            DocumentResult::Complete(text) => match self.sink.write(&name, &text).await {
                Ok(()) => {
                    info!("OCR completed: {} ({} pages, {} bytes)", name, page_count, text.len());
                    DocumentOutcome::Written {
                        name,
                        pages: page_count,
                        bytes: text.len(),
                    }
                }
                Err(e) => {
                    error!("Failed to write output for {}: {:#}", name, e);
                    DocumentOutcome::Failed {
                        name,
                        page_index: None,
                        reason: format!("{:#}", e),
                    }
                }
            },
            DocumentResult::Failed { page_index, reason } => {
                error!(
                    "Skipping {} due to OCR failure on page {}: {}",
                    name, page_index, reason
                );
                DocumentOutcome::Failed {
                    name,
                    page_index: Some(page_index),
                    reason,
                }
            }
        }
    }

    fn log_summary(&self, summary: &RunSummary) {
        info!(
            "Run finished: {} written, {} skipped, {} failed",
            summary.written, summary.skipped, summary.failed
        );
    }
}
