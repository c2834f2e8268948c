//! Symbol classifier: what follows a located mention.

use serde::{Deserialize, Serialize};

use crate::types::{ObservedSymbol, RequiredSymbol};

/// Characters skipped between a term and its symbol by default.
pub const DEFAULT_SKIP_CHARS: &str = " \t\r\n\u{a0}.-–—:,";

/// How much separation is allowed between a term and its symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Characters that may sit between the term and the symbol.
    pub skip_chars: String,
    /// Upper bound on skipped characters; `None` skips any run of them.
    pub max_gap: Option<usize>,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            skip_chars: DEFAULT_SKIP_CHARS.to_string(),
            max_gap: None,
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub observed: ObservedSymbol,
    /// First character after the skipped gap, if any.
    pub found: Option<char>,
}

/// Classify the text right after a mention.
pub fn classify(trailing: &str, required: RequiredSymbol, tolerance: &Tolerance) -> Classification {
    let limit = tolerance.max_gap.unwrap_or(usize::MAX);
    let mut found = None;
    for (skipped, c) in trailing.chars().enumerate() {
        if skipped < limit && tolerance.skip_chars.contains(c) {
            continue;
        }
        found = Some(c);
        break;
    }

    let observed = match found {
        Some(c) if c == required.as_char() => ObservedSymbol::Present,
        Some(c) if c == required.opposite().as_char() => ObservedSymbol::Wrong,
        _ => ObservedSymbol::Missing,
    };
    Classification { observed, found }
}
