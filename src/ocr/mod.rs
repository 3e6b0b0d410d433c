//! OCR client abstraction.
//!
//! [`OcrClient`] is a single best-effort attempt against the remote endpoint;
//! retrying lives in [`retry::RetryingOcrClient`] so backends stay simple.

pub mod retry;
pub mod vision;

use crate::document::Page;
use crate::error::OcrError;

/// One page image in, extracted text (or the reason there is none) out.
#[async_trait::async_trait]
pub trait OcrClient: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self, page: &Page) -> Result<String, OcrError>;
}
