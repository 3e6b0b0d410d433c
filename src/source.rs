//! Page enumeration for documents stored as folders of page images.
//!
//! Layout: `<root>/<document>/<page image>`. Pages are ordered by a natural
//! sort of their filenames so `page2.png` comes before `page10.png`.

use crate::document::{Document, Page};
use anyhow::{Context, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Enumerates documents and, for one document, its pages in a stable order.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Document identifiers, in processing order.
    async fn documents(&self) -> Result<Vec<String>>;

    /// Load the pages of one document, indexed from 0 in document order.
    async fn load(&self, name: &str) -> Result<Document>;
}

/// Reads `<root>/<document>/*.{png,jpg,jpeg}`.
#[derive(Debug, Clone)]
pub struct DirPageSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirPageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_page_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl PageSource for DirPageSource {
    async fn documents(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read input directory: {:?}", self.root))?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort_by(|a, b| natural_cmp(a, b));
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<Document> {
        let dir = self.root.join(name);
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Failed to read document directory: {:?}", dir))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.is_page_image(&path) {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort_by(|a, b| natural_cmp(a, b));

        let mut pages = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let path = dir.join(file);
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read page image: {:?}", path))?;
            debug!("{}: page {} <- {}", name, index, file);
            pages.push(Page::new(index, image));
        }

        Ok(Document::new(name, pages))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Number(u64),
    Text(String),
}

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Split into alternating text and number runs; text compares case-insensitively.
fn natural_key(s: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in digit_runs().find_iter(s) {
        if m.start() > last {
            parts.push(KeyPart::Text(s[last..m.start()].to_lowercase()));
        }
        parts.push(match m.as_str().parse() {
            Ok(n) => KeyPart::Number(n),
            Err(_) => KeyPart::Text(m.as_str().to_string()),
        });
        last = m.end();
    }
    if last < s.len() {
        parts.push(KeyPart::Text(s[last..].to_lowercase()));
    }
    parts
}

/// Natural ordering, falling back to byte order so the sort is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        let mut names = vec![
            "report_page10.png",
            "report_page2.png",
            "report_page1.png",
            "Report_page3.png",
        ];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec![
                "report_page1.png",
                "report_page2.png",
                "Report_page3.png",
                "report_page10.png",
            ]
        );
    }

    #[test]
    fn test_natural_order_is_total_for_equal_keys() {
        assert_eq!(natural_cmp("p01.png", "p1.png"), Ordering::Less);
        assert_eq!(natural_cmp("p1.png", "p1.png"), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_dir_source_lists_and_orders_pages() {
        let root = tempfile::tempdir().unwrap();
        let doc = root.path().join("invoice");
        std::fs::create_dir(&doc).unwrap();
        std::fs::write(doc.join("invoice_page10.png"), b"ten").unwrap();
        std::fs::write(doc.join("invoice_page2.PNG"), b"two").unwrap();
        std::fs::write(doc.join("invoice_page1.jpg"), b"one").unwrap();
        std::fs::write(doc.join("notes.txt"), b"skip me").unwrap();
        std::fs::create_dir(root.path().join("contract")).unwrap();
        std::fs::write(root.path().join("stray.png"), b"not a document").unwrap();

        let source = DirPageSource::new(root.path());
        assert_eq!(source.documents().await.unwrap(), vec!["contract", "invoice"]);

        let document = source.load("invoice").await.unwrap();
        assert_eq!(document.name, "invoice");
        let images: Vec<&[u8]> = document.pages.iter().map(|p| p.image.as_slice()).collect();
        assert_eq!(images, vec![&b"one"[..], &b"two"[..], &b"ten"[..]]);
        assert_eq!(document.pages[2].index, 2);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let source = DirPageSource::new("/definitely/not/here");
        assert!(source.documents().await.is_err());
    }
}
