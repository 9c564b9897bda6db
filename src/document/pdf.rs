use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId};
use tracing::{debug, warn};

use super::{Document, DocumentError, DocumentKind, LinkAnnotation, LinkTarget, Rect, WordBox};
use crate::utils::pdf::{decode_pdf_string, extract_pages_text_mem};

/// Approximate advance of one glyph, as a fraction of the font size.
const GLYPH_ADVANCE: f32 = 0.5;
/// `TJ` kerning (thousandths of an em) more negative than this is read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = -250.0;

fn malformed(err: lopdf::Error) -> DocumentError {
    DocumentError::Malformed(err.to_string())
}

/// Where an annotation dictionary lives, so it can be borrowed mutably.
enum AnnotationSlot {
    Object(ObjectId),
    InlineInPageArray { page_id: ObjectId, index: usize },
    InlineInSharedArray { array_id: ObjectId, index: usize },
}

/// PDF backend built on `lopdf`, with flat page text from `pdf-extract`.
pub struct PdfDocument {
    inner: lopdf::Document,
    page_ids: Vec<ObjectId>,
    page_texts: Option<Vec<String>>,
}

impl PdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, DocumentError> {
        let inner =
            lopdf::Document::load_mem(bytes).map_err(|e| DocumentError::Parse(e.to_string()))?;
        if inner.is_encrypted() {
            return Err(DocumentError::Parse(
                "encrypted PDF is not supported".to_string(),
            ));
        }

        let page_ids: Vec<ObjectId> = inner.get_pages().into_values().collect();

        let page_texts = match extract_pages_text_mem(bytes) {
            Ok(texts) if texts.len() == page_ids.len() => Some(texts),
            Ok(texts) => {
                warn!(target: "document::pdf", extracted = texts.len(), pages = page_ids.len(), "Page text count mismatch; falling back to word boxes");
                None
            }
            Err(e) => {
                warn!(target: "document::pdf", "Flat text extraction failed; falling back to word boxes: {:#}", e);
                None
            }
        };

        debug!(target: "document::pdf", pages = page_ids.len(), "PDF loaded");
        Ok(Self {
            inner,
            page_ids,
            page_texts,
        })
    }

    fn page_id(&self, page: usize) -> Result<ObjectId, DocumentError> {
        self.page_ids
            .get(page)
            .copied()
            .ok_or(DocumentError::PageOutOfRange(page))
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object, DocumentError> {
        match object {
            Object::Reference(id) => self.inner.get_object(*id).map_err(malformed),
            other => Ok(other),
        }
    }

    /// The page's `/Annots` array, or an empty slice when the page has none.
    fn annotation_entries(&self, page: usize) -> Result<&[Object], DocumentError> {
        let page_dict = self
            .inner
            .get_dictionary(self.page_id(page)?)
            .map_err(malformed)?;
        match page_dict.get(b"Annots") {
            Ok(annots) => Ok(self.resolve(annots)?.as_array().map_err(malformed)?.as_slice()),
            Err(_) => Ok(&[]),
        }
    }

    fn annotation_dict(&self, page: usize, index: usize) -> Result<&Dictionary, DocumentError> {
        let entry = self.annotation_entries(page)?.get(index).ok_or_else(|| {
            DocumentError::Malformed(format!("no annotation {index} on page {page}"))
        })?;
        self.resolve(entry)?.as_dict().map_err(malformed)
    }

    fn annotation_slot(&self, page: usize, index: usize) -> Result<AnnotationSlot, DocumentError> {
        let page_id = self.page_id(page)?;
        let page_dict = self.inner.get_dictionary(page_id).map_err(malformed)?;
        let annots = page_dict.get(b"Annots").map_err(malformed)?;
        let (entries, shared) = match annots {
            Object::Reference(array_id) => (
                self.inner
                    .get_object(*array_id)
                    .and_then(Object::as_array)
                    .map_err(malformed)?,
                Some(*array_id),
            ),
            other => (other.as_array().map_err(malformed)?, None),
        };

        match (entries.get(index), shared) {
            (Some(Object::Reference(annot_id)), _) => Ok(AnnotationSlot::Object(*annot_id)),
            (Some(_), Some(array_id)) => Ok(AnnotationSlot::InlineInSharedArray { array_id, index }),
            (Some(_), None) => Ok(AnnotationSlot::InlineInPageArray { page_id, index }),
            (None, _) => Err(DocumentError::Malformed(format!(
                "no annotation {index} on page {page}"
            ))),
        }
    }

    fn annotation_dict_mut(
        &mut self,
        page: usize,
        index: usize,
    ) -> Result<&mut Dictionary, DocumentError> {
        let slot = self.annotation_slot(page, index)?;
        let object = match slot {
            AnnotationSlot::Object(id) => self.inner.get_object_mut(id).map_err(malformed)?,
            AnnotationSlot::InlineInPageArray { page_id, index } => self
                .inner
                .get_dictionary_mut(page_id)
                .and_then(|page| page.get_mut(b"Annots"))
                .and_then(Object::as_array_mut)
                .map_err(malformed)?
                .get_mut(index)
                .ok_or_else(|| DocumentError::Malformed("annotation vanished".to_string()))?,
            AnnotationSlot::InlineInSharedArray { array_id, index } => self
                .inner
                .get_object_mut(array_id)
                .and_then(Object::as_array_mut)
                .map_err(malformed)?
                .get_mut(index)
                .ok_or_else(|| DocumentError::Malformed("annotation vanished".to_string()))?,
        };
        object.as_dict_mut().map_err(malformed)
    }

    fn link_target(&self, annot: &Dictionary) -> LinkTarget {
        let action = match annot.get(b"A").map_err(malformed).and_then(|a| self.resolve(a)) {
            Ok(Object::Dictionary(action)) => action,
            _ => return LinkTarget::Internal,
        };
        let is_uri_action = action
            .get(b"S")
            .and_then(Object::as_name)
            .map(|name| name == b"URI")
            .unwrap_or(false);
        if !is_uri_action {
            return LinkTarget::Internal;
        }
        match action
            .get(b"URI")
            .map_err(malformed)
            .and_then(|uri| self.resolve(uri))
            .and_then(|uri| uri.as_str().map_err(malformed))
        {
            Ok(bytes) => LinkTarget::Uri(decode_pdf_string(bytes)),
            Err(_) => LinkTarget::Internal,
        }
    }

    fn parse_rect(&self, annot: &Dictionary) -> Result<Rect, DocumentError> {
        let coords = self
            .resolve(annot.get(b"Rect").map_err(malformed)?)?
            .as_array()
            .map_err(malformed)?;
        if coords.len() != 4 {
            return Err(DocumentError::Malformed(format!(
                "annotation rectangle has {} entries",
                coords.len()
            )));
        }
        let mut values = [0f32; 4];
        for (slot, value) in values.iter_mut().zip(coords) {
            *slot = self.resolve(value)?.as_float().map_err(malformed)?;
        }
        Ok(Rect::new(values[0], values[1], values[2], values[3]))
    }
}

impl Document for PdfDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn links(&self, page: usize) -> Result<Vec<LinkAnnotation>, DocumentError> {
        let mut links = Vec::new();
        for (index, entry) in self.annotation_entries(page)?.iter().enumerate() {
            let annot = match self.resolve(entry).and_then(|o| o.as_dict().map_err(malformed)) {
                Ok(annot) => annot,
                Err(e) => {
                    debug!(target: "document::pdf", page, index, "Skipping unreadable annotation: {}", e);
                    continue;
                }
            };
            let is_link = annot
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map(|name| name == b"Link")
                .unwrap_or(false);
            if !is_link {
                continue;
            }
            let rect = match self.parse_rect(annot) {
                Ok(rect) => rect,
                Err(e) => {
                    debug!(target: "document::pdf", page, index, "Skipping link without a usable /Rect: {}", e);
                    continue;
                }
            };
            links.push(LinkAnnotation {
                index,
                rect,
                target: self.link_target(annot),
            });
        }
        Ok(links)
    }

    fn page_text(&self, page: usize) -> Result<String, DocumentError> {
        self.page_id(page)?;
        if let Some(text) = self.page_texts.as_ref().and_then(|texts| texts.get(page)) {
            return Ok(text.clone());
        }
        let words = self.words(page)?;
        Ok(words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn words(&self, page: usize) -> Result<Vec<WordBox>, DocumentError> {
        let raw = self
            .inner
            .get_page_content(self.page_id(page)?)
            .map_err(malformed)?;
        let content = Content::decode(&raw).map_err(malformed)?;
        Ok(TextLayout::default().run(&content.operations))
    }

    fn insert_link(&mut self, page: usize, rect: Rect, uri: &str) -> Result<(), DocumentError> {
        let page_id = self.page_id(page)?;
        let bounds: Vec<Object> = vec![rect.x0.into(), rect.y0.into(), rect.x1.into(), rect.y1.into()];
        let annotation = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => bounds,
            "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            "A" => dictionary! {
                "S" => "URI",
                "URI" => Object::string_literal(uri),
            },
        };
        let annotation_id = self.inner.add_object(annotation);

        let existing = self
            .inner
            .get_dictionary(page_id)
            .map_err(malformed)?
            .get(b"Annots")
            .ok()
            .cloned();
        match existing {
            Some(Object::Reference(array_id)) => {
                self.inner
                    .get_object_mut(array_id)
                    .and_then(Object::as_array_mut)
                    .map_err(malformed)?
                    .push(Object::Reference(annotation_id));
            }
            Some(Object::Array(mut annots)) => {
                annots.push(Object::Reference(annotation_id));
                self.inner
                    .get_dictionary_mut(page_id)
                    .map_err(malformed)?
                    .set("Annots", annots);
            }
            Some(_) => {
                return Err(DocumentError::Malformed(
                    "page /Annots is not an array".to_string(),
                ))
            }
            None => {
                self.inner
                    .get_dictionary_mut(page_id)
                    .map_err(malformed)?
                    .set("Annots", vec![Object::Reference(annotation_id)]);
            }
        }
        Ok(())
    }

    fn replace_link_uri(
        &mut self,
        page: usize,
        link: &LinkAnnotation,
        uri: &str,
    ) -> Result<(), DocumentError> {
        let shared_action = match self.annotation_dict(page, link.index)?.get(b"A") {
            Ok(Object::Reference(action_id)) => Some(*action_id),
            Ok(Object::Dictionary(_)) => None,
            _ => {
                return Err(DocumentError::Malformed(
                    "link annotation has no action dictionary".to_string(),
                ))
            }
        };

        let action = match shared_action {
            Some(action_id) => self
                .inner
                .get_object_mut(action_id)
                .and_then(Object::as_dict_mut)
                .map_err(malformed)?,
            None => self
                .annotation_dict_mut(page, link.index)?
                .get_mut(b"A")
                .and_then(Object::as_dict_mut)
                .map_err(malformed)?,
        };
        action.set("URI", Object::string_literal(uri));
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|e| DocumentError::Serialize(e.to_string()))?;
        Ok(buffer)
    }
}

/// Walks content-stream text operators and emits approximate word boxes.
///
/// Glyph widths are not read from font programs; every glyph advances by
/// [`GLYPH_ADVANCE`] of the font size. Each text-showing operator is its own
/// run, so a word never spans two `Tj`/`TJ` operations.
struct TextLayout {
    font_size: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    words: Vec<WordBox>,
    current: Option<(String, f32, f32)>,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            words: Vec::new(),
            current: None,
        }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn operand(op: &Operation, index: usize) -> f32 {
    op.operands
        .get(index)
        .and_then(|o| o.as_float().ok())
        .unwrap_or(0.0)
}

impl TextLayout {
    fn run(mut self, operations: &[Operation]) -> Vec<WordBox> {
        for op in operations {
            match op.operator.as_str() {
                "BT" => {
                    self.text_matrix = IDENTITY;
                    self.line_matrix = IDENTITY;
                }
                "Tf" => self.font_size = operand(op, 1),
                "TL" => self.leading = operand(op, 0),
                "Td" => self.move_line(operand(op, 0), operand(op, 1)),
                "TD" => {
                    self.leading = -operand(op, 1);
                    self.move_line(operand(op, 0), operand(op, 1));
                }
                "Tm" => {
                    let m = [
                        operand(op, 0),
                        operand(op, 1),
                        operand(op, 2),
                        operand(op, 3),
                        operand(op, 4),
                        operand(op, 5),
                    ];
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
                "T*" => self.move_line(0.0, -self.leading),
                "Tj" => {
                    if let Some(Ok(bytes)) = op.operands.first().map(Object::as_str) {
                        self.show(bytes);
                    }
                    self.flush();
                }
                "'" => {
                    self.move_line(0.0, -self.leading);
                    if let Some(Ok(bytes)) = op.operands.first().map(Object::as_str) {
                        self.show(bytes);
                    }
                    self.flush();
                }
                "\"" => {
                    self.move_line(0.0, -self.leading);
                    if let Some(Ok(bytes)) = op.operands.get(2).map(Object::as_str) {
                        self.show(bytes);
                    }
                    self.flush();
                }
                "TJ" => {
                    if let Some(Ok(items)) = op.operands.first().map(Object::as_array) {
                        for item in items {
                            match item {
                                Object::String(bytes, _) => self.show(bytes),
                                other => {
                                    if let Ok(kern) = other.as_float() {
                                        if kern < TJ_SPACE_THRESHOLD {
                                            self.flush();
                                        }
                                        self.advance(-kern / 1000.0 * self.font_size);
                                    }
                                }
                            }
                        }
                    }
                    self.flush();
                }
                "ET" => self.flush(),
                _ => {}
            }
        }
        self.flush();
        self.words
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        let m = self.line_matrix;
        self.line_matrix = [
            m[0],
            m[1],
            m[2],
            m[3],
            tx * m[0] + ty * m[2] + m[4],
            tx * m[1] + ty * m[3] + m[5],
        ];
        self.text_matrix = self.line_matrix;
    }

    /// Moves the pen by `distance` text-space units along the baseline.
    fn advance(&mut self, distance: f32) {
        self.text_matrix[4] += distance * self.text_matrix[0];
        self.text_matrix[5] += distance * self.text_matrix[1];
    }

    fn show(&mut self, bytes: &[u8]) {
        let glyph_advance = GLYPH_ADVANCE * self.font_size;
        for ch in decode_pdf_string(bytes).chars() {
            if ch.is_whitespace() {
                self.flush();
            } else {
                let (x, y) = (self.text_matrix[4], self.text_matrix[5]);
                self.current
                    .get_or_insert_with(|| (String::new(), x, y))
                    .0
                    .push(ch);
            }
            self.advance(glyph_advance);
        }
    }

    fn flush(&mut self) {
        if let Some((text, x, y)) = self.current.take() {
            let scale_y = self.text_matrix[2].hypot(self.text_matrix[3]);
            let height = self.font_size * if scale_y > 0.0 { scale_y } else { 1.0 };
            let rect = Rect::new(x, y - 0.2 * height, self.text_matrix[4], y + 0.8 * height);
            self.words.push(WordBox::new(text, rect));
        }
    }
}
