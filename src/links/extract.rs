use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::pattern::ItemPattern;
use crate::document::{Document, Rect, WordBox};

/// Smallest number of adjacent word boxes joined by the rolling window.
pub const MIN_WINDOW: usize = 2;
/// Largest number of adjacent word boxes joined by the rolling window.
pub const MAX_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    WholeToken,
    RollingWindow,
}

/// One textual item-number occurrence and where it sits on its page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemMatch {
    pub page: usize,
    pub text: String,
    pub rect: Rect,
    pub strategy: MatchStrategy,
}

/// Every distinct URI link target in the document, first-seen order.
///
/// Internal links (page jumps, named destinations) are skipped. Duplicates are
/// removed by exact string equality only. Pages that cannot be read are
/// logged and skipped.
pub fn extract_uri_links(doc: &dyn Document) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for page in 0..doc.page_count() {
        let annotations = match doc.links(page) {
            Ok(annotations) => annotations,
            Err(e) => {
                warn!(target: "links::extract", page, "Skipping page with unreadable annotations: {}", e);
                continue;
            }
        };
        for uri in annotations.iter().filter_map(|a| a.uri()) {
            if seen.insert(uri.to_string()) {
                links.push(uri.to_string());
            }
        }
    }

    debug!(target: "links::extract", count = links.len(), "Collected URI links");
    links
}

/// Whole-token matches of `pattern` in a page's flat text.
///
/// Each distinct matched string is then located in the word boxes: every
/// word containing it yields one match carrying that word's rectangle.
/// Strings found in the text but in no single word are dropped.
pub fn find_whole_token_matches(
    page: usize,
    text: &str,
    words: &[WordBox],
    pattern: &ItemPattern,
) -> Vec<ItemMatch> {
    let mut distinct: Vec<&str> = Vec::new();
    for token in pattern.find_tokens(text) {
        if !distinct.contains(&token) {
            distinct.push(token);
        }
    }

    let mut matches = Vec::new();
    for token in distinct {
        let before = matches.len();
        for word in words
            .iter()
            .filter(|w| pattern.find_tokens(&w.text).contains(&token))
        {
            matches.push(ItemMatch {
                page,
                text: token.to_string(),
                rect: word.rect,
                strategy: MatchStrategy::WholeToken,
            });
        }
        if matches.len() == before {
            debug!(target: "links::extract", page, token, "Matched text has no single word box");
        }
    }
    matches
}

/// Rolling-window matches over adjacent word boxes.
///
/// For every start index, windows of [`MIN_WINDOW`]..=[`MAX_WINDOW`] words are
/// concatenated without separators, smallest first, and tested against the
/// whole pattern. Every matching window is reported, overlaps included; the
/// rectangle is the union of the first and last word's boxes.
pub fn find_window_matches(page: usize, words: &[WordBox], pattern: &ItemPattern) -> Vec<ItemMatch> {
    let mut matches = Vec::new();
    for start in 0..words.len() {
        let mut joined = words[start].text.clone();
        // end is inclusive, so window sizes run MIN_WINDOW..=MAX_WINDOW
        for end in start + MIN_WINDOW - 1..words.len().min(start + MAX_WINDOW) {
            joined.push_str(&words[end].text);
            if pattern.matches_exactly(&joined) {
                matches.push(ItemMatch {
                    page,
                    text: joined.clone(),
                    rect: words[start].rect.union(&words[end].rect),
                    strategy: MatchStrategy::RollingWindow,
                });
            }
        }
    }
    matches
}

/// Both matching strategies over every page, unfiltered.
pub fn find_item_matches(doc: &dyn Document, pattern: &ItemPattern) -> Vec<ItemMatch> {
    let mut matches = Vec::new();
    for page in 0..doc.page_count() {
        let words = match doc.words(page) {
            Ok(words) => words,
            Err(e) => {
                warn!(target: "links::extract", page, "Skipping page with unreadable text: {}", e);
                continue;
            }
        };
        match doc.page_text(page) {
            Ok(text) => matches.extend(find_whole_token_matches(page, &text, &words, pattern)),
            Err(e) => {
                warn!(target: "links::extract", page, "Flat text unavailable; whole-token matching skipped: {}", e)
            }
        }
        matches.extend(find_window_matches(page, &words, pattern));
    }
    debug!(target: "links::extract", pattern = pattern.template(), count = matches.len(), "Item matching finished");
    matches
}

/// Keeps the first occurrence of each `(page, text, rect)`.
pub fn dedup_matches(matches: Vec<ItemMatch>) -> Vec<ItemMatch> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| {
            seen.insert((
                m.page,
                m.text.clone(),
                m.rect.x0.to_bits(),
                m.rect.y0.to_bits(),
                m.rect.x1.to_bits(),
                m.rect.y1.to_bits(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::pdf::tests::{build_pdf, goto_link, text_ops, uri_link};
    use crate::document::pdf::PdfDocument;
    use crate::document::text::PlainTextDocument;

    fn boxes(texts: &[&str]) -> Vec<WordBox> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let x = i as f32 * 10.0;
                WordBox::new(*t, Rect::new(x, 0.0, x + 8.0, 5.0))
            })
            .collect()
    }

    #[test]
    fn uri_links_are_deduplicated_and_internal_links_skipped() {
        let bytes = build_pdf(
            text_ops(&[("x", 10.0, 10.0)]),
            vec![
                uri_link("https://a.example/", [0.0, 0.0, 1.0, 1.0]),
                goto_link([0.0, 0.0, 1.0, 1.0]),
                uri_link("https://a.example/", [5.0, 5.0, 6.0, 6.0]),
                uri_link("https://a.example", [7.0, 7.0, 8.0, 8.0]),
            ],
        );
        let doc = PdfDocument::load(&bytes).unwrap();
        assert_eq!(
            extract_uri_links(&doc),
            vec!["https://a.example/", "https://a.example"]
        );
    }

    #[test]
    fn document_without_links_yields_nothing() {
        let doc = PlainTextDocument::new("no links here");
        assert!(extract_uri_links(&doc).is_empty());
    }

    #[test]
    fn single_word_item_is_left_to_whole_token_path() {
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let words = boxes(&["SKU", "7-1234-A", "in stock"]);

        assert!(find_window_matches(0, &words, &pattern).is_empty());

        let whole = find_whole_token_matches(0, "SKU 7-1234-A in stock", &words, &pattern);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].text, "7-1234-A");
        assert_eq!(whole[0].rect, words[1].rect);
        assert_eq!(whole[0].strategy, MatchStrategy::WholeToken);
    }

    #[test]
    fn longer_neighbouring_item_does_not_claim_the_match() {
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let words = boxes(&["17-1234-A", "7-1234-A"]);

        let whole = find_whole_token_matches(0, "17-1234-A 7-1234-A", &words, &pattern);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].text, "7-1234-A");
        assert_eq!(whole[0].rect, words[1].rect);
    }

    #[test]
    fn punctuation_around_the_word_still_places_the_match() {
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let words = boxes(&["(7-1234-A),", "next"]);

        let whole = find_whole_token_matches(0, "(7-1234-A), next", &words, &pattern);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].rect, words[0].rect);
    }

    #[test]
    fn window_joins_split_runs_and_unions_boxes() {
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let words = boxes(&["SKU", "7-", "1234", "-A", "in"]);
        let found = find_window_matches(0, &words, &pattern);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "7-1234-A");
        assert_eq!(found[0].rect, Rect::new(10.0, 0.0, 38.0, 5.0));
    }

    #[test]
    fn overlapping_windows_are_all_reported() {
        let pattern = ItemPattern::compile("LN").unwrap();
        let words = boxes(&["A", "1", "B", "2"]);
        // "A1B2" is rejected: the pattern has to cover the whole window
        let texts: Vec<String> = find_window_matches(0, &words, &pattern)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["A1", "B2"]);

        let pattern = ItemPattern::compile("NN").unwrap();
        let words = boxes(&["1", "2", "3"]);
        let texts: Vec<String> = find_window_matches(0, &words, &pattern)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["12", "23"]);
    }

    #[test]
    fn window_never_exceeds_six_words() {
        let pattern = ItemPattern::compile("NNNNNNN").unwrap();
        let words = boxes(&["1", "2", "3", "4", "5", "6", "7"]);
        assert!(find_window_matches(0, &words, &pattern).is_empty());

        let pattern = ItemPattern::compile("NNNNNN").unwrap();
        assert_eq!(find_window_matches(0, &words[..6], &pattern).len(), 1);
    }

    #[test]
    fn item_matches_cover_both_strategies_and_dedup_collapses_repeats() {
        let doc = PlainTextDocument::new("Order 7-1234-A or 8-\n5678-B today. Again 7-1234-A");
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let matches = find_item_matches(&doc, &pattern);

        let whole: Vec<&str> = matches
            .iter()
            .filter(|m| m.strategy == MatchStrategy::WholeToken)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(whole, vec!["7-1234-A", "7-1234-A"]);

        let windows: Vec<&str> = matches
            .iter()
            .filter(|m| m.strategy == MatchStrategy::RollingWindow)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(windows, vec!["8-5678-B"]);

        let mut doubled = matches.clone();
        doubled.extend(matches.clone());
        assert_eq!(dedup_matches(doubled).len(), matches.len());
    }

    #[test]
    fn empty_document_has_no_matches() {
        let doc = PlainTextDocument::new("");
        let pattern = ItemPattern::compile("NN").unwrap();
        assert!(find_item_matches(&doc, &pattern).is_empty());
    }
}
