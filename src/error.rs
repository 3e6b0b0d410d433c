#![allow(dead_code)]
//! Error taxonomy for a single OCR attempt.

use thiserror::Error;

/// Why one call to the OCR endpoint did not produce text.
///
/// `Transport` covers connection failures and timeouts; `Status` and
/// `Malformed` are protocol errors (the server answered, but not usefully).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcrError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("OCR endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed OCR response: {0}")]
    Malformed(String),
}

impl OcrError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        !self.is_transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(OcrError::Transport("timed out".into()).is_transport());
        assert!(OcrError::Status { status: 502, body: String::new() }.is_protocol());
        assert!(OcrError::Malformed("no choices".into()).is_protocol());
    }

    #[test]
    fn test_display_includes_status() {
        let err = OcrError::Status { status: 503, body: "busy".into() };
        assert_eq!(err.to_string(), "OCR endpoint returned 503: busy");
    }
}
