//! Antigen name cleaning.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*?\]").unwrap())
}

/// Antigen name without `[...]` annotations and with whitespace collapsed.
pub fn clean_antigen_name(name: &str) -> Option<String> {
    let cleaned = bracket_regex().replace_all(name.trim(), "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Lookup table from each distinct antigen name to its cleaned form.
/// Blank names are skipped.
pub fn clean_antigen_names<I, S>(names: I) -> HashMap<String, Option<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter(|n| !n.as_ref().trim().is_empty())
        .map(|n| {
            let n = n.as_ref();
            (n.to_string(), clean_antigen_name(n))
        })
        .collect()
}
