//! Prominence strategies: which text on a page counts as "prominent".
//!
//! A [`ProminenceStrategy`] turns a parsed DOM into candidate [`TextBlock`]s
//! in priority order. The locator checks blocks in that order, so the
//! strategy alone decides what "first prominent mention" means for a site.
//!
//! The renderer tags elements it found invisible before exporting HTML:
//! [`HIDDEN_ATTR`] marks a `display: none` subtree, [`INVISIBLE_ATTR`] marks
//! a single element that is `visibility: hidden` or has no layout box.
//! Strategies skip both, so the same filtering applies to live pages and to
//! cached HTML.
//!
//! `scraper` types are `!Send`; parse and extract inside one synchronous
//! call (or `spawn_blocking`) and only move the resulting blocks around.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::types::{AuditError, AuditResult};

/// Attribute marking an element whose whole subtree is not rendered.
pub const HIDDEN_ATTR: &str = "data-markaudit-hidden";

/// Attribute marking a single element with no visible box.
pub const INVISIBLE_ATTR: &str = "data-markaudit-invisible";

/// Elements whose text never counts as page copy.
const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Block elements walked by [`DocumentOrderStrategy`].
const DOCUMENT_BLOCKS: &str =
    "h1, h2, h3, h4, h5, h6, p, li, td, th, dt, dd, caption, figcaption, blockquote, summary";

/// A candidate text node with its location in the DOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    /// Whitespace-collapsed text content.
    pub text: String,
    /// CSS-like path, e.g. `html > body > main > h1.pdp-title`.
    pub path: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            path: path.into(),
        }
    }
}

/// Rendered text of one page, ordered by prominence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub url: String,
    pub blocks: Vec<TextBlock>,
}

impl PageContent {
    /// Parse HTML and extract candidate blocks with the given strategy.
    pub fn from_html(url: &str, html: &str, strategy: &dyn ProminenceStrategy) -> Self {
        let document = Html::parse_document(html);
        Self {
            url: url.to_string(),
            blocks: strategy.candidates(&document),
        }
    }
}

/// Given a DOM, return candidate text blocks in priority order.
pub trait ProminenceStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;
    /// Candidate blocks, most prominent first. Must be deterministic.
    fn candidates(&self, document: &Html) -> Vec<TextBlock>;
}

/// Which built-in strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Headings and hero selectors first, then the first body-copy block.
    #[default]
    Selectors,
    /// Every visible block in document order.
    DocumentOrder,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "selectors" => Ok(Self::Selectors),
            "document_order" => Ok(Self::DocumentOrder),
            other => Err(format!(
                "unknown strategy '{other}' (expected selectors or document-order)"
            )),
        }
    }
}

/// Prominence settings, read from the `prominence` section of the terms file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProminenceConfig {
    pub strategy: StrategyKind,
    /// Main-content roots, tried in order; falls back to `body`.
    pub roots: Vec<String>,
    /// Priority selectors for [`StrategyKind::Selectors`], taken one at a time.
    pub priority: Vec<String>,
    /// Selector for body copy; the first visible non-empty match is used.
    pub body_copy: String,
    /// Boilerplate containers whose contents are skipped.
    pub exclude: Vec<String>,
}

impl Default for ProminenceConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Selectors,
            roots: vec!["main".into()],
            priority: [
                "h1",
                "h2",
                "h3",
                ".hero",
                ".product-title",
                ".page-intro",
                ".pdp-title",
                ".tile-title",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            body_copy: "p, li".into(),
            exclude: [
                "nav",
                "footer",
                "[role=\"navigation\"]",
                "[role=\"contentinfo\"]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ProminenceConfig {
    /// Compile the configured strategy. Invalid selectors are config errors.
    pub fn build(&self) -> AuditResult<Box<dyn ProminenceStrategy>> {
        let scope = Scope {
            roots: parse_selectors(&self.roots)?,
            exclude: parse_selectors(&self.exclude)?,
        };
        Ok(match self.strategy {
            StrategyKind::Selectors => Box::new(SelectorStrategy {
                scope,
                priority: parse_selectors(&self.priority)?,
                body_copy: parse_selector(&self.body_copy)?,
            }),
            StrategyKind::DocumentOrder => Box::new(DocumentOrderStrategy {
                scope,
                blocks: parse_selector(DOCUMENT_BLOCKS)?,
            }),
        })
    }
}

fn parse_selector(raw: &str) -> AuditResult<Selector> {
    Selector::parse(raw)
        .map_err(|e| AuditError::Config(format!("invalid CSS selector '{raw}': {e:?}")))
}

fn parse_selectors(raw: &[String]) -> AuditResult<Vec<Selector>> {
    raw.iter().map(|s| parse_selector(s)).collect()
}

/// Root selection and visibility filtering shared by the strategies.
struct Scope {
    roots: Vec<Selector>,
    exclude: Vec<Selector>,
}

impl Scope {
    fn root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        self.roots
            .iter()
            .find_map(|sel| document.select(sel).next())
            .or_else(|| {
                Selector::parse("body")
                    .ok()
                    .and_then(|body| document.select(&body).next())
            })
            .unwrap_or_else(|| document.root_element())
    }

    /// Visible and outside of boilerplate containers.
    fn admits(&self, el: ElementRef<'_>) -> bool {
        if el.value().attr(INVISIBLE_ATTR).is_some() {
            return false;
        }
        std::iter::once(el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .all(|node| {
                node.value().attr(HIDDEN_ATTR).is_none()
                    && !self.exclude.iter().any(|sel| sel.matches(&node))
            })
    }
}

/// Headings and hero selectors first, then the first visible body copy.
pub struct SelectorStrategy {
    scope: Scope,
    priority: Vec<Selector>,
    body_copy: Selector,
}

impl ProminenceStrategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "selectors"
    }

    fn candidates(&self, document: &Html) -> Vec<TextBlock> {
        let root = self.scope.root(document);
        let mut seen = Vec::new();
        let mut blocks = Vec::new();

        for sel in &self.priority {
            for el in root.select(sel) {
                if seen.contains(&el.id()) || !self.scope.admits(el) {
                    continue;
                }
                seen.push(el.id());
                if let Some(block) = text_block(el) {
                    blocks.push(block);
                }
            }
        }

        let body = root
            .select(&self.body_copy)
            .filter(|el| !seen.contains(&el.id()) && self.scope.admits(*el))
            .find_map(text_block);
        blocks.extend(body);

        blocks
    }
}

/// Every visible text block under the root, in document order.
pub struct DocumentOrderStrategy {
    scope: Scope,
    blocks: Selector,
}

impl ProminenceStrategy for DocumentOrderStrategy {
    fn name(&self) -> &'static str {
        "document_order"
    }

    fn candidates(&self, document: &Html) -> Vec<TextBlock> {
        let root = self.scope.root(document);
        root.select(&self.blocks)
            .filter(|el| self.scope.admits(*el))
            .filter_map(text_block)
            .collect()
    }
}

fn text_block(el: ElementRef<'_>) -> Option<TextBlock> {
    let text = visible_text(el);
    if text.is_empty() {
        return None;
    }
    Some(TextBlock {
        text,
        path: dom_path(el),
    })
}

/// `textContent` minus scripts, styles and hidden subtrees, whitespace-collapsed.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let suppressed = node
            .ancestors()
            .take_while(|a| a.id() != el.id())
            .chain(std::iter::once(*el))
            .filter_map(ElementRef::wrap)
            .any(|a| {
                NON_TEXT_TAGS.contains(&a.value().name()) || a.value().attr(HIDDEN_ATTR).is_some()
            });
        if !suppressed {
            out.push_str(text);
        }
    }
    collapse_whitespace(&out)
}

/// Collapse runs of whitespace (including NBSP) to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn dom_path(el: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .map(|node| {
            let v = node.value();
            let mut part = v.name().to_string();
            if let Some(id) = v.id() {
                part.push('#');
                part.push_str(id);
            }
            for class in v.classes() {
                part.push('.');
                part.push_str(class);
            }
            part
        })
        .collect();
    parts.reverse();
    parts.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(html: &str, config: &ProminenceConfig) -> Vec<TextBlock> {
        let strategy = config.build().unwrap();
        PageContent::from_html("https://example.com/", html, strategy.as_ref()).blocks
    }

    const PRODUCT_PAGE: &str = r#"<html><body>
        <nav><h2>Vitamix Shop</h2></nav>
        <main>
          <p class="intro">Blend  anything with the   Vitamix blender.</p>
          <h2>Why Vitamix?</h2>
          <h1 id="title" class="pdp-title">Vitamix<sup>®</sup> A3500</h1>
          <li>Warranty</li>
        </main>
        <footer><p>Vitamix footer</p></footer>
    </body></html>"#;

    #[test]
    fn selector_strategy_orders_by_priority_then_body_copy() {
        let got = blocks(PRODUCT_PAGE, &ProminenceConfig::default());
        let texts: Vec<&str> = got.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Vitamix® A3500",
                "Why Vitamix?",
                "Blend anything with the Vitamix blender."
            ]
        );
        assert_eq!(got[0].path, "html > body > main > h1#title.pdp-title");
    }

    #[test]
    fn element_matching_two_selectors_is_listed_once() {
        let html = r#"<main><h1 class="hero">Ascent</h1><p>copy</p></main>"#;
        let got = blocks(html, &ProminenceConfig::default());
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text, "Ascent");
    }

    #[test]
    fn falls_back_to_body_and_skips_boilerplate() {
        let html = r#"<body>
            <header role="navigation"><h1>Menu Vitamix</h1></header>
            <h1>Main Vitamix</h1>
            <footer><h1>Footer</h1></footer>
        </body>"#;
        let got = blocks(html, &ProminenceConfig::default());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "Main Vitamix");
    }

    #[test]
    fn hidden_and_invisible_elements_are_skipped() {
        let html = format!(
            r#"<main>
                <div {HIDDEN_ATTR}><h1>Hidden heading</h1></div>
                <h1 {INVISIBLE_ATTR}>Zero size</h1>
                <h1>Shown <span {HIDDEN_ATTR}>secret</span>heading<script>var x = 1;</script></h1>
            </main>"#
        );
        let got = blocks(&html, &ProminenceConfig::default());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "Shown heading");
    }

    #[test]
    fn document_order_strategy_walks_blocks_in_order() {
        let config = ProminenceConfig {
            strategy: StrategyKind::DocumentOrder,
            ..ProminenceConfig::default()
        };
        let got = blocks(PRODUCT_PAGE, &config);
        let texts: Vec<&str> = got.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Blend anything with the Vitamix blender.",
                "Why Vitamix?",
                "Vitamix® A3500",
                "Warranty"
            ]
        );
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let config = ProminenceConfig {
            priority: vec!["h1[".into()],
            ..ProminenceConfig::default()
        };
        assert!(matches!(config.build(), Err(AuditError::Config(_))));
    }

    #[test]
    fn strategy_kind_from_cli_spelling() {
        assert_eq!("document-order".parse::<StrategyKind>(), Ok(StrategyKind::DocumentOrder));
        assert_eq!("Selectors".parse::<StrategyKind>(), Ok(StrategyKind::Selectors));
        assert!("random".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn collapse_whitespace_handles_nbsp() {
        assert_eq!(collapse_whitespace("  Vitamix\u{a0}\n ® "), "Vitamix ®");
    }
}
