//! V/D/J gene name normalisation onto IMGT-style names.

use regex::Regex;
use std::sync::OnceLock;

fn legacy_locus_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // TCRA/TCRB/TCRG/TCRD → TRA/TRB/TRG/TRD
    RE.get_or_init(|| Regex::new(r"^TCR([ABGD])").unwrap())
}

/// Gene name with the legacy `TCR` locus prefix rewritten to `TR` and any
/// allele suffix (`*01`, `*01_F`) removed. Names are not checked against a
/// gene list. Blank names become `None`.
pub fn normalize_gene(name: &str) -> Option<String> {
    let name = name.trim();
    let name = legacy_locus_regex().replace(name, "TR$1");
    let name = match name.find('*') {
        Some(idx) => &name[..idx],
        None => &name[..],
    };
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
