//! Core data types for trademark terms, page findings, and fetch failures.

use serde::{Deserialize, Serialize};

/// The legal symbol a term must carry on its first prominent use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredSymbol {
    /// ® — registered trademark.
    Registered,
    /// ™ — unregistered trademark.
    Trademark,
}

impl RequiredSymbol {
    /// Parse a marker character as written in the terms file.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim() {
            "®" => Some(Self::Registered),
            "™" => Some(Self::Trademark),
            _ => None,
        }
    }

    /// The character this symbol is written as.
    pub fn as_char(self) -> char {
        match self {
            Self::Registered => '®',
            Self::Trademark => '™',
        }
    }

    /// The other recognized symbol.
    pub fn opposite(self) -> Self {
        match self {
            Self::Registered => Self::Trademark,
            Self::Trademark => Self::Registered,
        }
    }
}

impl std::fmt::Display for RequiredSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl Serialize for RequiredSymbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(self.as_char())
    }
}

impl<'de> Deserialize<'de> for RequiredSymbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_marker(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized symbol '{raw}'")))
    }
}

/// Which occurrences of a term are checked on each page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionPolicy {
    /// Only the first prominent occurrence per page.
    #[default]
    FirstProminentOnly,
}

/// A trademark term and the symbol it must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermDefinition {
    pub term: String,
    #[serde(rename = "symbol")]
    pub required_symbol: RequiredSymbol,
    /// Alternate surface forms. These only widen detection; the symbol is
    /// checked after whichever form matched.
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
    #[serde(default)]
    pub policy: MentionPolicy,
}

fn default_case_insensitive() -> bool {
    true
}

impl TermDefinition {
    /// Build a case-insensitive definition with no variants.
    pub fn new(term: impl Into<String>, required_symbol: RequiredSymbol) -> Self {
        Self {
            term: term.into(),
            required_symbol,
            variants: Vec::new(),
            case_insensitive: true,
            policy: MentionPolicy::FirstProminentOnly,
        }
    }

    /// Add alternate surface forms.
    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    /// Match the term case-sensitively.
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// The term followed by its variants, in file order.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.term.as_str()).chain(self.variants.iter().map(String::as_str))
    }
}

/// One row of the input URL list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    /// Zero-based position in the input file; used only for report ordering.
    pub index: usize,
    pub url: String,
}

/// What was observed after the located mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedSymbol {
    Present,
    Missing,
    Wrong,
}

impl ObservedSymbol {
    /// Missing and Wrong are issues; Present is not.
    pub fn is_issue(self) -> bool {
        !matches!(self, Self::Present)
    }

    /// Sort key for reports: lower is more severe.
    pub fn severity_rank(self) -> u8 {
        match self {
            Self::Missing => 0,
            Self::Wrong => 1,
            Self::Present => 2,
        }
    }

    /// Stable lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Missing => "missing",
            Self::Wrong => "wrong",
        }
    }

    /// Short label used in tabular and HTML output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Present => "ok",
            Self::Missing => "missing symbol",
            Self::Wrong => "wrong symbol",
        }
    }
}

impl std::fmt::Display for ObservedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A recorded observation for one (URL, term) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub url: String,
    pub term: String,
    /// The surface form that matched (the term itself or one of its variants).
    pub matched: String,
    pub required_symbol: RequiredSymbol,
    pub observed: ObservedSymbol,
    /// First significant character after the mention, if any.
    pub found: Option<char>,
    /// DOM path of the text block holding the mention.
    pub path: String,
    pub snippet: String,
    /// Screenshot path relative to the output directory.
    pub screenshot: Option<String>,
}

/// Where in the fetch pipeline a URL failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Navigation,
    Extraction,
    Audit,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigation => write!(f, "navigation error"),
            Self::Extraction => write!(f, "extraction error"),
            Self::Audit => write!(f, "audit error"),
        }
    }
}

/// Per-URL error record. Never reported as a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub url: String,
    pub stage: FailureStage,
    pub attempts: u32,
    pub message: String,
}

impl FetchFailure {
    /// Record a per-URL error after `attempts` tries. Errors other than
    /// [`AuditError::Fetch`] are attributed to the audit stage.
    pub fn from_error(url: &str, error: AuditError, attempts: u32) -> Self {
        let (stage, message) = match error {
            AuditError::Fetch { stage, message, .. } => (stage, message),
            other => (FailureStage::Audit, other.to_string()),
        };
        Self {
            url: url.to_string(),
            stage,
            attempts,
            message,
        }
    }
}

/// Errors that can occur while loading inputs, fetching pages, or writing
/// reports.
#[derive(thiserror::Error, Debug)]
pub enum AuditError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("{stage} for {url}: {message}")]
    Fetch {
        url: String,
        stage: FailureStage,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn fetch(url: &str, stage: FailureStage, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_string(),
            stage,
            message: message.into(),
        }
    }
}

/// Convenience result type.
pub type AuditResult<T> = Result<T, AuditError>;
