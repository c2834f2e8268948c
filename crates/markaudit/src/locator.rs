//! Mention locator: the first prominent occurrence of a term on a page.

use regex::{Regex, RegexBuilder};

use crate::prominence::TextBlock;
use crate::types::{AuditError, AuditResult, TermDefinition};

/// Compiled matcher for one term and its variants.
#[derive(Debug, Clone)]
pub struct MentionMatcher {
    regex: Regex,
}

/// A located mention inside one text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mention<'a> {
    /// Index of the block in prominence order.
    pub block: usize,
    /// Byte offsets of the match within the block text.
    pub start: usize,
    pub end: usize,
    /// The text as it appears on the page.
    pub matched: &'a str,
}

impl<'a> Mention<'a> {
    /// Everything after the mention in its block.
    pub fn trailing(&self, blocks: &'a [TextBlock]) -> &'a str {
        &blocks[self.block].text[self.end..]
    }
}

impl MentionMatcher {
    /// Build a matcher over the term and its variants.
    ///
    /// Longer forms are tried first, so at any given position the longest
    /// surface form wins ("Ascent Series" over "Ascent").
    pub fn new(def: &TermDefinition) -> AuditResult<Self> {
        let mut forms: Vec<&str> = def.surface_forms().filter(|f| !f.is_empty()).collect();
        forms.sort_by_key(|f| std::cmp::Reverse(f.chars().count()));
        forms.dedup();

        let pattern = forms
            .iter()
            .map(|f| regex::escape(f))
            .collect::<Vec<_>>()
            .join("|");
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(def.case_insensitive)
            .build()
            .map_err(|e| AuditError::Config(format!("term '{}': {e}", def.term)))?;
        Ok(Self { regex })
    }

    /// Leftmost match in a single string, as byte offsets.
    pub fn find_in<'t>(&self, text: &'t str) -> Option<(usize, usize, &'t str)> {
        self.regex
            .find(text)
            .map(|m| (m.start(), m.end(), m.as_str()))
    }

    /// First block (in prominence order) containing the term, and the
    /// leftmost match inside it.
    pub fn locate<'a>(&self, blocks: &'a [TextBlock]) -> Option<Mention<'a>> {
        blocks.iter().enumerate().find_map(|(i, block)| {
            self.find_in(&block.text).map(|(start, end, matched)| Mention {
                block: i,
                start,
                end,
                matched,
            })
        })
    }
}
