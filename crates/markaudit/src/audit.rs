//! Page audit: locate and classify every term on one page.

use crate::classifier::{classify, Tolerance};
use crate::loader::TermsFile;
use crate::locator::MentionMatcher;
use crate::prominence::{PageContent, ProminenceStrategy};
use crate::types::{AuditResult, Finding, TermDefinition};

/// Characters of context kept before a mention in the snippet.
const SNIPPET_BEFORE: usize = 80;

/// Characters of context kept after a mention in the snippet.
const SNIPPET_AFTER: usize = 220;

/// Compiled, read-only audit rules shared by all fetch workers.
pub struct AuditRules {
    terms: Vec<(TermDefinition, MentionMatcher)>,
    strategy: Box<dyn ProminenceStrategy>,
    tolerance: Tolerance,
}

impl std::fmt::Debug for AuditRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRules")
            .field("terms", &self.terms.len())
            .field("strategy", &self.strategy.name())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

/// Findings for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAudit {
    pub url: String,
    /// One finding per term found, in terms-file order.
    pub findings: Vec<Finding>,
    /// Terms that did not appear in any prominent block.
    pub absent_terms: Vec<String>,
}

impl PageAudit {
    /// At least one finding is Missing or Wrong.
    pub fn has_issues(&self) -> bool {
        self.findings.iter().any(|f| f.observed.is_issue())
    }

    /// Attach a screenshot reference to every issue finding.
    pub fn with_screenshot(mut self, path: &str) -> Self {
        for finding in self.findings.iter_mut().filter(|f| f.observed.is_issue()) {
            finding.screenshot = Some(path.to_string());
        }
        self
    }
}

impl AuditRules {
    /// Compile matchers for every term.
    pub fn new(
        terms: Vec<TermDefinition>,
        strategy: Box<dyn ProminenceStrategy>,
        tolerance: Tolerance,
    ) -> AuditResult<Self> {
        let terms = terms
            .into_iter()
            .map(|def| MentionMatcher::new(&def).map(|m| (def, m)))
            .collect::<AuditResult<Vec<_>>>()?;
        Ok(Self {
            terms,
            strategy,
            tolerance,
        })
    }

    /// Build rules from a loaded terms file, using its prominence settings.
    pub fn from_terms_file(file: &TermsFile) -> AuditResult<Self> {
        Self::new(
            file.terms.clone(),
            file.prominence.build()?,
            file.tolerance.clone(),
        )
    }

    pub fn terms(&self) -> impl Iterator<Item = &TermDefinition> {
        self.terms.iter().map(|(def, _)| def)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Parse rendered HTML and audit it.
    pub fn audit_html(&self, url: &str, html: &str) -> PageAudit {
        let content = PageContent::from_html(url, html, self.strategy.as_ref());
        self.audit_content(&content)
    }

    /// Audit already-extracted page content.
    pub fn audit_content(&self, page: &PageContent) -> PageAudit {
        let mut findings = Vec::new();
        let mut absent_terms = Vec::new();

        for (def, matcher) in &self.terms {
            let Some(mention) = matcher.locate(&page.blocks) else {
                absent_terms.push(def.term.clone());
                continue;
            };
            let block = &page.blocks[mention.block];
            let class = classify(
                mention.trailing(&page.blocks),
                def.required_symbol,
                &self.tolerance,
            );
            findings.push(Finding {
                url: page.url.clone(),
                term: def.term.clone(),
                matched: mention.matched.to_string(),
                required_symbol: def.required_symbol,
                observed: class.observed,
                found: class.found,
                path: block.path.clone(),
                snippet: snippet(&block.text, mention.start, mention.end),
                screenshot: None,
            });
        }

        PageAudit {
            url: page.url.clone(),
            findings,
            absent_terms,
        }
    }
}

/// Context window around a mention, with ellipses where text was cut.
fn snippet(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(SNIPPET_BEFORE - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(SNIPPET_AFTER)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    let mut out = String::new();
    if from > 0 {
        out.push('…');
    }
    out.push_str(&text[from..to]);
    if to < text.len() {
        out.push('…');
    }
    out
}
