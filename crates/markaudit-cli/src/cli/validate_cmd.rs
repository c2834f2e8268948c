//! `markaudit validate`: check the input files without launching a browser.

use std::path::Path;

use anyhow::{Context, Result};
use markaudit::{AuditRules, StrategyKind};

use super::audit_cmd::load_inputs;
use super::output;

/// Load both inputs and compile the audit rules, reporting what was found.
pub fn run(urls_file: &Path, marks_file: &Path, strategy: Option<StrategyKind>) -> Result<()> {
    let (urls, terms) = load_inputs(urls_file, marks_file, strategy)?;
    let rules = AuditRules::from_terms_file(&terms).context("invalid terms file")?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "valid": true,
            "urls": urls.len(),
            "terms": rules.terms().map(|t| &t.term).collect::<Vec<_>>(),
            "strategy": rules.strategy_name(),
        }));
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    println!("[OK] {} URLs in {}", urls.len(), urls_file.display());
    println!("[OK] {} terms in {}", terms.terms.len(), marks_file.display());
    for def in rules.terms() {
        if def.variants.is_empty() {
            println!("       {} {}", def.term, def.required_symbol);
        } else {
            println!(
                "       {} {} (variants: {})",
                def.term,
                def.required_symbol,
                def.variants.join(", ")
            );
        }
    }
    println!("[OK] prominence strategy: {}", rules.strategy_name());
    Ok(())
}
