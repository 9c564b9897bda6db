//! Item-number templates.
//!
//! A template is a tiny grammar over three kinds of element:
//!
//! | template | matches                      |
//! |----------|------------------------------|
//! | `N`      | one ASCII digit              |
//! | `L`      | one ASCII letter             |
//! | `\x`     | the literal character `x`    |
//! | other    | that character, literally    |
//!
//! So `N-NNNN-L` matches `7-1234-A`, and `\NNN` matches `N42`.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("item pattern is empty")]
    Empty,
    #[error("item pattern ends with an unfinished escape ('\\')")]
    DanglingEscape,
    #[error("item pattern could not be compiled: {0}")]
    Regex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Digit,
    Letter,
    Literal(char),
}

impl Element {
    fn is_word_char(&self) -> bool {
        match self {
            Element::Digit | Element::Letter => true,
            Element::Literal(c) => c.is_alphanumeric() || *c == '_',
        }
    }

    fn to_regex(self) -> String {
        match self {
            Element::Digit => "[0-9]".to_string(),
            Element::Letter => "[A-Za-z]".to_string(),
            Element::Literal(c) => regex::escape(c.encode_utf8(&mut [0u8; 4])),
        }
    }
}

/// A compiled item template.
#[derive(Debug, Clone)]
pub struct ItemPattern {
    template: String,
    literal: bool,
    token_regex: Regex,
    exact_regex: Regex,
}

impl ItemPattern {
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        if template.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut elements = Vec::with_capacity(template.len());
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            let element = match c {
                '\\' => Element::Literal(chars.next().ok_or(PatternError::DanglingEscape)?),
                'N' => Element::Digit,
                'L' => Element::Letter,
                other => Element::Literal(other),
            };
            elements.push(element);
        }

        let literal = elements.iter().all(|e| matches!(e, Element::Literal(_)));
        let body: String = elements.iter().map(|e| e.to_regex()).collect();

        // Literal templates degrade to plain substring search.
        let token_source = if literal {
            body.clone()
        } else {
            let lead = if elements.first().is_some_and(Element::is_word_char) {
                r"\b"
            } else {
                ""
            };
            let trail = if elements.last().is_some_and(Element::is_word_char) {
                r"\b"
            } else {
                ""
            };
            format!("{lead}(?:{body}){trail}")
        };

        let token_regex =
            Regex::new(&token_source).map_err(|e| PatternError::Regex(e.to_string()))?;
        let exact_regex =
            Regex::new(&format!("^(?:{body})$")).map_err(|e| PatternError::Regex(e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            literal,
            token_regex,
            exact_regex,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// True when the template has no `N`/`L` placeholders.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// Whole-token occurrences in `text`, left to right, non-overlapping.
    pub fn find_tokens<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.token_regex.find_iter(text).map(|m| m.as_str()).collect()
    }

    /// True when all of `candidate` is one item.
    pub fn matches_exactly(&self, candidate: &str) -> bool {
        self.exact_regex.is_match(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_and_letters_match_whole_tokens_only() {
        let pattern = ItemPattern::compile("N-NNNN-L").unwrap();
        let found = pattern.find_tokens("SKU 7-1234-A and 8-5678-b, not 17-1234-AB");
        assert_eq!(found, vec!["7-1234-A", "8-5678-b"]);
    }

    #[test]
    fn exact_match_rejects_partial_candidates() {
        let pattern = ItemPattern::compile("LLNNN").unwrap();
        assert!(pattern.matches_exactly("AB123"));
        assert!(!pattern.matches_exactly("AB1234"));
        assert!(!pattern.matches_exactly(" AB123"));
    }

    #[test]
    fn escapes_produce_literal_placeholders() {
        let pattern = ItemPattern::compile(r"\NNN-\\L").unwrap();
        assert!(pattern.matches_exactly(r"N42-\x"));
        assert!(!pattern.matches_exactly(r"742-\x"));
        assert!(!pattern.is_literal());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let pattern = ItemPattern::compile("N.N(L)").unwrap();
        assert!(pattern.matches_exactly("1.2(x)"));
        assert!(!pattern.matches_exactly("142(x)"));
    }

    #[test]
    fn literal_template_degrades_to_substring_search() {
        let pattern = ItemPattern::compile(r"ACME-\N").unwrap();
        assert!(pattern.is_literal());
        let found: Vec<&str> = pattern.find_tokens("XACME-NY");
        assert_eq!(found, vec!["ACME-N"]);
    }

    #[test]
    fn leading_punctuation_does_not_require_word_boundary() {
        let pattern = ItemPattern::compile("#NNN").unwrap();
        let found: Vec<&str> = pattern.find_tokens("part#123 and #4567");
        assert_eq!(found, vec!["#123"]);
    }

    #[test]
    fn rejects_empty_and_dangling_escape() {
        assert_eq!(ItemPattern::compile("").unwrap_err(), PatternError::Empty);
        assert_eq!(
            ItemPattern::compile(r"NN\").unwrap_err(),
            PatternError::DanglingEscape
        );
    }
}
