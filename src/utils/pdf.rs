// Minimal PDF helpers shared by the document backend and input sniffing.
// Structural work (annotations, content streams) lives in document::pdf.

use anyhow::Context;

/// Extracts the flat text of every page from a PDF stored fully in memory.
/// This is a thin wrapper over the `pdf-extract` crate API; the parser is known to
/// panic on some malformed inputs, so panics are turned into errors here.
pub fn extract_pages_text_mem(bytes: &[u8]) -> anyhow::Result<Vec<String>> {
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| anyhow::anyhow!("pdf-extract panicked while reading the document"))?
        .context("failed to extract page text from PDF bytes using pdf-extract")?;
    Ok(pages)
}

/// Returns true if given content-type or head indicates a PDF file.
/// - Content-Type: application/pdf (case-insensitive, substring match)
/// - Magic bytes: %PDF- (leading whitespace tolerated)
pub fn is_pdf(content_type: Option<&str>, head: &[u8]) -> bool {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    ct.contains("application/pdf") || head[start..].starts_with(b"%PDF-")
}

/// Decodes a PDF text string: UTF-16BE when it carries a BOM, otherwise UTF-8
/// with a byte-per-char (PDFDocEncoding/Latin-1 approximation) fallback.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
