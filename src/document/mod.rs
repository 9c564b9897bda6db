//! Document access used by the link pipelines.
//!
//! Both the link checker and the rewrite engine only need a small slice of a
//! document engine: enumerate pages, read link annotations, read positioned
//! text, insert or retarget link annotations and serialize the result. The
//! [`Document`] trait captures exactly that so PDF and plain-text inputs can
//! flow through the same code.

pub mod pdf;
pub mod text;

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::utils::pdf::is_pdf;

/// Errors raised by a document backend.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse document: {0}")]
    Parse(String),
    #[error("page {0} does not exist")]
    PageOutOfRange(usize),
    #[error("malformed document structure: {0}")]
    Malformed(String),
    #[error("operation not supported for {kind} documents: {operation}")]
    Unsupported {
        kind: DocumentKind,
        operation: &'static str,
    },
    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    /// Sniffs the kind from magic bytes first, then from the file name extension.
    /// Returns `None` for formats without a backend (DOCX, images, ...).
    pub fn detect(bytes: &[u8], file_name: Option<&str>) -> Option<Self> {
        let head = &bytes[..bytes.len().min(1024)];
        if is_pdf(None, head) {
            return Some(Self::Pdf);
        }

        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Some(Self::Pdf),
            Some("txt") | Some("text") | Some("md") | Some("csv") => Some(Self::PlainText),
            Some(_) => None,
            // No name to go on: accept anything that decodes as text and has no NUL bytes
            None if !head.contains(&0) && std::str::from_utf8(head).is_ok() => {
                Some(Self::PlainText)
            }
            None => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "txt",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => write!(f, "PDF"),
            Self::PlainText => write!(f, "plain-text"),
        }
    }
}

/// Axis-aligned rectangle in the page's user space (`x0 <= x1`, `y0 <= y1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// A run of non-whitespace text with its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordBox {
    pub text: String,
    pub rect: Rect,
}

impl WordBox {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
        }
    }
}

/// Where a link annotation points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Uri(String),
    /// Page jumps, named destinations and any other non-URI action.
    Internal,
}

/// A link annotation as read from a page.
///
/// `index` is the backend's handle for the annotation on its page and is only
/// meaningful for [`Document::replace_link_uri`] on the same document.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    pub index: usize,
    pub rect: Rect,
    pub target: LinkTarget,
}

impl LinkAnnotation {
    pub fn uri(&self) -> Option<&str> {
        match &self.target {
            LinkTarget::Uri(uri) => Some(uri),
            LinkTarget::Internal => None,
        }
    }
}

/// Capabilities the link pipelines need from a document engine.
/// Pages are zero-based.
pub trait Document: Send {
    fn kind(&self) -> DocumentKind;

    fn page_count(&self) -> usize;

    fn links(&self, page: usize) -> Result<Vec<LinkAnnotation>, DocumentError>;

    /// Flat extracted text of a page.
    fn page_text(&self, page: usize) -> Result<String, DocumentError>;

    /// Positioned word boxes of a page, in reading order.
    fn words(&self, page: usize) -> Result<Vec<WordBox>, DocumentError>;

    /// Adds a new URI link annotation covering `rect`.
    fn insert_link(&mut self, page: usize, rect: Rect, uri: &str) -> Result<(), DocumentError>;

    /// Points an existing link annotation at `uri`, keeping its location.
    fn replace_link_uri(
        &mut self,
        page: usize,
        link: &LinkAnnotation,
        uri: &str,
    ) -> Result<(), DocumentError>;

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError>;
}

/// Opens `bytes` with the backend matching `kind`.
pub fn open_document(bytes: &[u8], kind: DocumentKind) -> Result<Box<dyn Document>, DocumentError> {
    match kind {
        DocumentKind::Pdf => Ok(Box::new(pdf::PdfDocument::load(bytes)?)),
        DocumentKind::PlainText => Ok(Box::new(text::PlainTextDocument::from_bytes(bytes)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_magic_regardless_of_name() {
        assert_eq!(
            DocumentKind::detect(b"%PDF-1.7\n...", Some("upload.bin")),
            Some(DocumentKind::Pdf)
        );
    }

    #[test]
    fn detects_text_by_extension_and_rejects_docx() {
        assert_eq!(
            DocumentKind::detect(b"hello", Some("notes.TXT")),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(DocumentKind::detect(b"PK\x03\x04", Some("brochure.docx")), None);
    }

    #[test]
    fn nameless_binary_is_rejected() {
        assert_eq!(DocumentKind::detect(&[0x50, 0x4b, 0x03, 0x04, 0x00], None), None);
        assert_eq!(
            DocumentKind::detect(b"see https://example.com", None),
            Some(DocumentKind::PlainText)
        );
    }

    #[test]
    fn rect_union_covers_both() {
        let a = Rect::new(10.0, 10.0, 20.0, 20.0);
        let b = Rect::new(30.0, 5.0, 40.0, 15.0);
        assert_eq!(a.union(&b), Rect::new(10.0, 5.0, 40.0, 20.0));
    }
}
