#![allow(dead_code)]
//! Document, page and result types shared by every pipeline stage.

use image::ImageFormat;

/// One image unit within a document. Immutable once enumerated.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based position within the document; defines output order.
    pub index: usize,
    pub image: Vec<u8>,
    /// MIME type used in the data URL sent to the OCR endpoint.
    pub mime: &'static str,
}

impl Page {
    /// Build a page, sniffing the MIME type from the payload's magic bytes.
    pub fn new(index: usize, image: Vec<u8>) -> Self {
        let mime = sniff_mime(&image);
        Self { index, image, mime }
    }
}

/// Map magic bytes to a MIME type, defaulting to PNG like the endpoint expects.
fn sniff_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Tiff) => "image/tiff",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "image/png",
    }
}

/// An ordered collection of pages sharing one output artifact.
#[derive(Debug, Clone)]
pub struct Document {
    /// Identifier; also the key in the output sink.
    pub name: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }

    /// Build a document from raw images, assigning indices in the given order.
    pub fn from_images(name: impl Into<String>, images: Vec<Vec<u8>>) -> Self {
        let pages = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| Page::new(index, image))
            .collect();
        Self::new(name, pages)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Why a page could not be turned into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// How many calls to the endpoint were made before giving up.
    pub attempts: u32,
    pub reason: String,
}

/// Outcome of OCR-ing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    Text(String),
    Failed(PageFailure),
}

impl PageResult {
    pub fn failed(attempts: u32, reason: impl Into<String>) -> Self {
        Self::Failed(PageFailure {
            attempts,
            reason: reason.into(),
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// Aggregate result for a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentResult {
    /// Every page produced text; pages joined in index order.
    Complete(String),
    /// The first failing page in index order. All other text is discarded.
    Failed { page_index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_mime_sniffing() {
        assert_eq!(Page::new(0, PNG_MAGIC.to_vec()).mime, "image/png");
        assert_eq!(Page::new(0, JPEG_MAGIC.to_vec()).mime, "image/jpeg");
        // Unknown payloads fall back to PNG
        assert_eq!(Page::new(0, b"not an image".to_vec()).mime, "image/png");
    }

    #[test]
    fn test_from_images_assigns_indices() {
        let doc = Document::from_images("scan", vec![vec![1], vec![2], vec![3]]);
        assert_eq!(doc.page_count(), 3);
        let indices: Vec<usize> = doc.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(doc.pages[2].image, vec![3]);
    }
}
