//! markaudit — trademark symbol auditing for rendered web pages.
//!
//! The crate is the pure half of the pipeline: load inputs, pick prominent
//! text from a DOM, locate each term, classify the symbol that follows it,
//! and write reports. Fetching pages is left to the caller.

pub mod audit;
pub mod classifier;
pub mod loader;
pub mod locator;
pub mod prominence;
pub mod report;
pub mod types;

pub use audit::{AuditRules, PageAudit};
pub use classifier::{classify, Classification, Tolerance};
pub use loader::{read_terms, read_urls, TermsFile};
pub use locator::{Mention, MentionMatcher};
pub use prominence::{PageContent, ProminenceConfig, ProminenceStrategy, StrategyKind, TextBlock};
pub use report::{write_report, Report, ReportStatus, RunSummary};
pub use types::*;
