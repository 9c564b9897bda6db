use once_cell::sync::Lazy;
use regex::Regex;

use super::{Document, DocumentError, DocumentKind, LinkAnnotation, LinkTarget, Rect, WordBox};
use crate::utils::decode::decode_to_utf8;

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("valid url regex"));

/// Byte ranges of every URL occurrence, with trailing sentence punctuation trimmed.
fn url_spans(content: &str) -> Vec<(usize, usize)> {
    URL_REGEX
        .find_iter(content)
        .map(|m| {
            let trimmed = m
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}']);
            (m.start(), m.start() + trimmed.len())
        })
        .collect()
}

/// Plain-text document: a single page whose "link annotations" are the
/// `http(s)://` URLs written in the text.
///
/// Coordinates are synthetic: `x` counts characters from the start of the
/// line and `y` counts lines from the top, so rectangles still order and
/// union correctly for pattern matching.
/// URL spans are found once, when the document is created, and shifted on
/// every replacement, so a link's index stays valid whatever the new URI holds.
pub struct PlainTextDocument {
    content: String,
    spans: Vec<(usize, usize)>,
}

impl PlainTextDocument {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let spans = url_spans(&content);
        Self { content, spans }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let content =
            decode_to_utf8(bytes, None).map_err(|e| DocumentError::Parse(format!("{:#}", e)))?;
        Ok(Self::new(content))
    }

    fn check_page(&self, page: usize) -> Result<(), DocumentError> {
        if page == 0 {
            Ok(())
        } else {
            Err(DocumentError::PageOutOfRange(page))
        }
    }

    fn rect_for_span(&self, start: usize, end: usize) -> Rect {
        let before = &self.content[..start];
        let line = before.matches('\n').count() as f32;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let col = self.content[line_start..start].chars().count() as f32;
        let width = self.content[start..end].chars().count() as f32;
        Rect::new(col, line, col + width, line + 1.0)
    }
}

impl Document for PlainTextDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::PlainText
    }

    fn page_count(&self) -> usize {
        1
    }

    fn links(&self, page: usize) -> Result<Vec<LinkAnnotation>, DocumentError> {
        self.check_page(page)?;
        Ok(self
            .spans
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| LinkAnnotation {
                index,
                rect: self.rect_for_span(start, end),
                target: LinkTarget::Uri(self.content[start..end].to_string()),
            })
            .collect())
    }

    fn page_text(&self, page: usize) -> Result<String, DocumentError> {
        self.check_page(page)?;
        Ok(self.content.clone())
    }

    fn words(&self, page: usize) -> Result<Vec<WordBox>, DocumentError> {
        self.check_page(page)?;
        let mut words = Vec::new();
        for (line_no, line) in self.content.lines().enumerate() {
            let mut start: Option<usize> = None;
            let chars: Vec<char> = line.chars().collect();
            for col in 0..=chars.len() {
                let is_space = chars.get(col).map(|c| c.is_whitespace()).unwrap_or(true);
                match (start, is_space) {
                    (None, false) => start = Some(col),
                    (Some(from), true) => {
                        let text: String = chars[from..col].iter().collect();
                        let y = line_no as f32;
                        words.push(WordBox::new(
                            text,
                            Rect::new(from as f32, y, col as f32, y + 1.0),
                        ));
                        start = None;
                    }
                    _ => {}
                }
            }
        }
        Ok(words)
    }

    fn insert_link(&mut self, _page: usize, _rect: Rect, _uri: &str) -> Result<(), DocumentError> {
        Err(DocumentError::Unsupported {
            kind: DocumentKind::PlainText,
            operation: "insert link annotation",
        })
    }

    fn replace_link_uri(
        &mut self,
        page: usize,
        link: &LinkAnnotation,
        uri: &str,
    ) -> Result<(), DocumentError> {
        self.check_page(page)?;
        let (start, end) = self
            .spans
            .get(link.index)
            .copied()
            .ok_or_else(|| DocumentError::Malformed(format!("no URL {} in text", link.index)))?;
        if Some(&self.content[start..end]) != link.uri() {
            return Err(DocumentError::Malformed(
                "URL text changed since it was read".to_string(),
            ));
        }
        self.content.replace_range(start..end, uri);

        let (old_len, new_len) = (end - start, uri.len());
        self.spans[link.index] = (start, start + new_len);
        for span in &mut self.spans[link.index + 1..] {
            *span = (span.0 - old_len + new_len, span.1 - old_len + new_len);
        }
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        Ok(self.content.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_urls_and_trims_trailing_punctuation() {
        let doc = PlainTextDocument::new(
            "Order at https://shop.example.com/item?ref=abc.\nDocs (https://docs.example.org/a)",
        );
        let uris: Vec<String> = doc
            .links(0)
            .unwrap()
            .iter()
            .filter_map(|l| l.uri().map(str::to_string))
            .collect();
        assert_eq!(
            uris,
            vec![
                "https://shop.example.com/item?ref=abc",
                "https://docs.example.org/a"
            ]
        );
    }

    #[test]
    fn words_carry_line_and_column_boxes() {
        let doc = PlainTextDocument::new("SKU 7-1234-A\n  in stock");
        let words = doc.words(0).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[1].text, "7-1234-A");
        assert_eq!(words[1].rect, Rect::new(4.0, 0.0, 12.0, 1.0));
        assert_eq!(words[2].rect, Rect::new(2.0, 1.0, 4.0, 2.0));
    }

    #[test]
    fn replacing_a_link_rewrites_only_that_occurrence() {
        let mut doc = PlainTextDocument::new("a https://x.example/ b https://x.example/ c");
        let links = doc.links(0).unwrap();
        doc.replace_link_uri(0, &links[1], "https://x.example/?utm_source=s")
            .unwrap();
        let text = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            "a https://x.example/ b https://x.example/?utm_source=s c"
        );
    }

    #[test]
    fn link_handles_survive_replacements_that_add_whitespace() {
        let mut doc = PlainTextDocument::new("a https://a.example/x b https://b.example/y c");
        let links = doc.links(0).unwrap();
        doc.replace_link_uri(0, &links[0], "https://a.example/x?q=two words")
            .unwrap();
        doc.replace_link_uri(0, &links[1], "https://b.example/y?q=1")
            .unwrap();

        let text = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            "a https://a.example/x?q=two words b https://b.example/y?q=1 c"
        );
        let uris: Vec<String> = doc
            .links(0)
            .unwrap()
            .iter()
            .filter_map(|l| l.uri().map(str::to_string))
            .collect();
        assert_eq!(
            uris,
            vec!["https://a.example/x?q=two words", "https://b.example/y?q=1"]
        );
    }

    #[test]
    fn inserting_links_is_unsupported() {
        let mut doc = PlainTextDocument::new("x");
        let err = doc
            .insert_link(0, Rect::new(0.0, 0.0, 1.0, 1.0), "https://y.example/")
            .unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported { .. }));
    }

    #[test]
    fn only_one_page_exists() {
        let doc = PlainTextDocument::new("x");
        assert!(matches!(doc.words(1), Err(DocumentError::PageOutOfRange(1))));
    }
}
