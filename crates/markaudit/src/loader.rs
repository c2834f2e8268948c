//! Input loading: the CSV URL list and the JSON terms file.
//!
//! Both loaders are strict. Anything that would make the run meaningless
//! (missing file, no `url` column, no terms, an unknown symbol) is a
//! [`AuditError::Config`] and aborts before any page is fetched.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::classifier::Tolerance;
use crate::prominence::ProminenceConfig;
use crate::types::{
    AuditError, AuditResult, MentionPolicy, RequiredSymbol, TermDefinition, UrlEntry,
};

/// Schemes a URL row may use.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Everything read from the terms file.
#[derive(Debug, Clone, Default)]
pub struct TermsFile {
    pub terms: Vec<TermDefinition>,
    pub prominence: ProminenceConfig,
    pub tolerance: Tolerance,
}

/// Term object as written in the file, before validation.
#[derive(Debug, Deserialize)]
struct RawTerm {
    #[serde(default)]
    term: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    variants: Option<Vec<String>>,
    #[serde(default)]
    case_insensitive: Option<bool>,
    #[serde(default)]
    policy: Option<String>,
}

fn config_err(msg: impl Into<String>) -> AuditError {
    AuditError::Config(msg.into())
}

/// Read the URL list from a CSV file with a `url` header column.
pub fn read_urls(path: &Path) -> AuditResult<Vec<UrlEntry>> {
    let file = std::fs::File::open(path)
        .map_err(|e| config_err(format!("cannot open URL file {}: {e}", path.display())))?;
    parse_urls(file, &path.display().to_string())
}

/// Parse a URL list from any CSV reader. `source` names it in errors.
pub fn parse_urls<R: Read>(reader: R, source: &str) -> AuditResult<Vec<UrlEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| config_err(format!("{source}: malformed CSV header: {e}")))?;
    let column = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case("url"))
        .ok_or_else(|| config_err(format!("{source}: CSV must contain a 'url' column")))?;

    let mut urls = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record =
            record.map_err(|e| config_err(format!("{source}: malformed CSV row {}: {e}", row + 2)))?;
        let raw = record.get(column).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        let url = validate_url(raw)
            .map_err(|e| config_err(format!("{source}: row {}: {e}", row + 2)))?;
        urls.push(UrlEntry {
            index: urls.len(),
            url,
        });
    }

    if urls.is_empty() {
        return Err(config_err(format!("{source}: no URLs found")));
    }

    tracing::debug!("loaded {} URL(s) from {source}", urls.len());
    Ok(urls)
}

/// Check that a URL is well-formed and uses a fetchable scheme.
pub fn validate_url(raw: &str) -> Result<String, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(format!(
            "unsupported scheme '{}' in '{raw}' (expected http, https or file)",
            parsed.scheme()
        ));
    }
    Ok(raw.to_string())
}

/// Read term definitions (and optional matching settings) from a JSON file.
pub fn read_terms(path: &Path) -> AuditResult<TermsFile> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| config_err(format!("cannot read terms file {}: {e}", path.display())))?;
    parse_terms(&text, &path.display().to_string())
}

/// Parse a terms document.
///
/// Accepts either a bare array of term objects or an object with a `marks`
/// (or `terms`) array plus optional `prominence` and `tolerance` sections.
pub fn parse_terms(text: &str, source: &str) -> AuditResult<TermsFile> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| config_err(format!("{source}: malformed JSON: {e}")))?;

    let (raw_terms, prominence, tolerance) = match doc {
        Value::Array(items) => (items, ProminenceConfig::default(), Tolerance::default()),
        Value::Object(mut obj) => {
            let items = match obj.remove("marks").or_else(|| obj.remove("terms")) {
                Some(Value::Array(items)) => items,
                Some(_) => return Err(config_err(format!("{source}: 'marks' must be an array"))),
                None => return Err(config_err(format!("{source}: missing 'marks' array"))),
            };
            let prominence = match obj.remove("prominence") {
                Some(v) => serde_json::from_value(v)
                    .map_err(|e| config_err(format!("{source}: invalid 'prominence': {e}")))?,
                None => ProminenceConfig::default(),
            };
            let tolerance = match obj.remove("tolerance") {
                Some(v) => serde_json::from_value(v)
                    .map_err(|e| config_err(format!("{source}: invalid 'tolerance': {e}")))?,
                None => Tolerance::default(),
            };
            (items, prominence, tolerance)
        }
        _ => {
            return Err(config_err(format!(
                "{source}: expected an array of terms or an object with 'marks'"
            )))
        }
    };

    let mut seen = HashSet::new();
    let mut terms = Vec::with_capacity(raw_terms.len());
    for (i, item) in raw_terms.into_iter().enumerate() {
        let raw: RawTerm = serde_json::from_value(item)
            .map_err(|e| config_err(format!("{source}: mark #{}: {e}", i + 1)))?;
        let def = validate_term(raw).map_err(|e| config_err(format!("{source}: mark #{}: {e}", i + 1)))?;
        if !seen.insert(def.term.clone()) {
            return Err(config_err(format!("{source}: duplicate term '{}'", def.term)));
        }
        terms.push(def);
    }

    if terms.is_empty() {
        return Err(config_err(format!("{source}: no marks defined")));
    }

    tracing::debug!("loaded {} term(s) from {source}", terms.len());
    Ok(TermsFile {
        terms,
        prominence,
        tolerance,
    })
}

fn validate_term(raw: RawTerm) -> Result<TermDefinition, String> {
    let term = raw.term.trim().to_string();
    if term.is_empty() {
        return Err("'term' must be a non-empty string".into());
    }
    let required_symbol = RequiredSymbol::from_marker(&raw.symbol)
        .ok_or_else(|| format!("'{term}': symbol must be ® or ™, got '{}'", raw.symbol))?;
    let policy = match raw.policy.as_deref().map(str::trim) {
        None | Some("") | Some("first_prominent_only") => MentionPolicy::FirstProminentOnly,
        Some(other) => return Err(format!("'{term}': unknown policy '{other}'")),
    };

    let mut variants: Vec<String> = Vec::new();
    for v in raw.variants.unwrap_or_default() {
        let v = v.trim().to_string();
        if !v.is_empty() && v != term && !variants.contains(&v) {
            variants.push(v);
        }
    }

    Ok(TermDefinition {
        term,
        required_symbol,
        variants,
        case_insensitive: raw.case_insensitive.unwrap_or(true),
        policy,
    })
}
