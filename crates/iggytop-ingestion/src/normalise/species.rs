//! Species/organism name resolution.
//!
//! Free-text organism strings ("EBV", "HomoSapiens", "SARS-CoV2",
//! "Homo sapiens (human)", taxonomy IRIs) are mapped to canonical species
//! names in layers:
//!   1. ontology IRIs are dereferenced to their label
//!   2. manual abbreviation table, longest prefix wins
//!   3. regex cleanup of separators, qualifiers and casing
//!   4. optionally, a Zooma organism annotation of the cleaned term
//!
//! Resolution runs once per distinct value of a column, never per row.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::ontology::LabelLookup;

/// Abbreviation → full species/virus name.
const MANUAL_DISAMBIGUATION: &[(&str, &str)] = &[
    ("AdV", "Human adenovirus"),
    ("CMV", "Cytomegalovirus"),
    ("DENV", "Dengue virus"),
    ("EBV", "Human gammaherpesvirus 4"),
    ("HCV", "Hepatitis C virus"),
    ("HHV", "Human herpesvirus"),
    ("HIV", "Human immunodeficiency virus"),
    ("HPV", "Human papillomavirus"),
    ("HTLV", "Human T-cell leukemia virus"),
    ("HSV", "Herpes simplex virus"),
    ("InfluenzaA", "Influenza A virus"),
    ("LCMV", "Lymphocytic choriomeningitis virus"),
    ("MCPyV", "Merkel cell polyomavirus"),
    ("McpyV", "Merkel cell polyomavirus"),
    ("Mtb", "Mycobacterium tuberculosis"),
    ("SARS-CoV1", "Severe acute respiratory syndrome coronavirus"),
    ("SARS-CoV2", "Severe acute respiratory syndrome coronavirus 2"),
    ("SARS-CoV", "Severe acute respiratory syndrome coronavirus"),
    ("SIV", "Simian immunodeficiency virus"),
    ("YFV", "Yellow fever virus"),
];

const SARS_COV_2: &str = "Severe acute respiratory syndrome coronavirus 2";
const SARS_COV_2_VARIANTS: [&str; 2] = [
    "severe acute respiratory syndrome coronavirus 2",
    "severe acute respiratory coronavirus 2",
];

fn separator_digit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_/](\d)").unwrap())
}

fn bracketed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[\(\[].*[\)\]]").unwrap())
}

fn qualifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(strain|str\.|subsp\.|variant|genotype)\s+\S+").unwrap()
    })
}

fn camel_case_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z])([A-Z])").unwrap())
}

/// "SARS2" → "SARS 2", "HHV12a" → "HHV 12a". A single digit followed by a
/// letter ("EBV1a") is left alone. Only the start of the term is touched.
fn split_leading_digits(term: &str) -> String {
    let letters = term.bytes().take_while(u8::is_ascii_alphabetic).count();
    let rest = &term[letters..];
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if letters == 0 || digits == 0 {
        return term.to_string();
    }
    let followed_by_letter = rest[digits..]
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic());
    if digits == 1 && followed_by_letter {
        return term.to_string();
    }
    format!("{} {}", &term[..letters], rest)
}

/// Substitute the longest matching abbreviation prefix, keeping the suffix.
fn expand_abbreviation(term: &str) -> String {
    MANUAL_DISAMBIGUATION
        .iter()
        .filter(|(prefix, _)| term.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, full)| format!("{full}{}", &term[prefix.len()..]))
        .unwrap_or_else(|| term.to_string())
}

fn capitalize_first(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_acronym(word: &str) -> bool {
    word.chars().all(char::is_alphabetic) && !word.chars().any(char::is_lowercase)
}

/// Local (offline) normalisation of one organism term. `None` when nothing
/// is left after cleanup.
pub fn normalize_species(term: &str) -> Option<String> {
    let term = split_leading_digits(term.trim());
    let term = expand_abbreviation(&term);

    let term = term.replace('_', " ");
    let term = separator_digit_regex().replace_all(&term, " $1");
    let term = capitalize_first(&term);

    let term = bracketed_regex().replace_all(&term, "");
    let term = qualifier_regex().replace_all(&term, "").into_owned();

    let term = if term.contains('-') {
        term
    } else {
        camel_case_regex().replace_all(&term, "$1 $2").into_owned()
    };

    let lowered = term.to_lowercase();
    let term = if SARS_COV_2_VARIANTS.iter().any(|v| lowered.contains(v)) {
        SARS_COV_2.to_string()
    } else {
        term
    };

    let mut words = term.split_whitespace();
    let first = words.next()?;
    let mut normalized = vec![first.to_string()];
    for word in words {
        if is_acronym(word) {
            normalized.push(word.to_string());
        } else {
            normalized.push(word.to_lowercase());
        }
    }
    Some(normalized.join(" "))
}

/// Lookup table from each distinct organism term to its canonical name.
///
/// IRIs ("http...") are replaced by their ontology label before cleanup; an
/// IRI whose label cannot be fetched is kept verbatim. With `zooma`, each
/// cleaned term is additionally annotated and a confident label replaces it.
/// Lookups run one after another.
pub async fn map_species_terms<I, S>(
    terms: I,
    lookup: &dyn LabelLookup,
    zooma: bool,
) -> HashMap<String, Option<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut mapping = HashMap::new();
    let mut n_changed = 0usize;

    for term in terms {
        let term = term.as_ref();
        if term.trim().is_empty() || mapping.contains_key(term) {
            continue;
        }

        let normalized = if term.starts_with("http") {
            match lookup.label_for_uri(term).await {
                Some((label, _)) => normalize_species(&label),
                None => Some(term.to_string()),
            }
        } else {
            normalize_species(term)
        };

        let resolved = match (zooma, normalized) {
            (true, Some(local)) => match lookup.annotate_organism(&local).await {
                Some(label) => Some(label),
                None => Some(local),
            },
            (_, normalized) => normalized,
        };

        if resolved.as_deref() != Some(term) {
            n_changed += 1;
            debug!(term, ?resolved, "Species term mapped");
        }
        mapping.insert(term.to_string(), resolved);
    }

    info!(n_terms = mapping.len(), n_changed, zooma, "Species terms harmonised");
    mapping
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::MockLabelLookup;

    fn norm(term: &str) -> String {
        normalize_species(term).unwrap()
    }

    #[test]
    fn test_manual_override_keeps_suffix() {
        let ebv = norm("EBV_strain1");
        assert!(ebv.starts_with("Human gammaherpesvirus 4"), "{ebv}");
        assert_eq!(norm("CMV"), "Cytomegalovirus");
        assert_eq!(norm("HIV-1"), "Human immunodeficiency virus 1");
        assert_eq!(norm("InfluenzaA"), "Influenza A virus");
    }

    #[test]
    fn test_longest_prefix_wins() {
        assert_eq!(norm("SARS-CoV1"), "Severe acute respiratory syndrome coronavirus");
        assert_eq!(norm("SARS-CoV2"), SARS_COV_2);
        assert_eq!(norm("SARS-CoV"), "Severe acute respiratory syndrome coronavirus");
    }

    #[test]
    fn test_sars_cov_2_variants_collapse() {
        assert_eq!(norm("severe acute respiratory syndrome coronavirus 2"), SARS_COV_2);
        assert_eq!(norm("Severe Acute Respiratory Coronavirus 2 (Wuhan)"), SARS_COV_2);
    }

    #[test]
    fn test_leading_digit_split() {
        assert_eq!(split_leading_digits("SARS2"), "SARS 2");
        assert_eq!(split_leading_digits("HHV12a"), "HHV 12a");
        assert_eq!(split_leading_digits("EBV1a"), "EBV1a");
        assert_eq!(split_leading_digits("Homo sapiens"), "Homo sapiens");
        assert_eq!(norm("SARS2"), "SARS 2");
    }

    #[test]
    fn test_brackets_and_qualifiers_removed() {
        assert_eq!(norm("Homo sapiens (human)"), "Homo sapiens");
        assert_eq!(norm("Mycobacterium tuberculosis strain H37Rv"), "Mycobacterium tuberculosis");
        assert_eq!(norm("Escherichia coli str. K12"), "Escherichia coli");
    }

    #[test]
    fn test_camel_case_and_casing() {
        assert_eq!(norm("HomoSapiens"), "Homo sapiens");
        assert_eq!(norm("mus Musculus"), "Mus musculus");
        assert_eq!(norm("Hepatitis B virus HBV"), "Hepatitis B virus HBV");
    }

    #[test]
    fn test_blank_term() {
        assert_eq!(normalize_species("   "), None);
        assert_eq!(normalize_species("(unknown)"), None);
    }

    #[tokio::test]
    async fn test_map_species_terms_dereferences_iris() {
        let iri = "http://purl.obolibrary.org/obo/NCBITaxon_9606";
        let unknown = "http://purl.obolibrary.org/obo/NCBITaxon_0";
        let lookup = MockLabelLookup::new().with_label(iri, "Homo sapiens");
        let map = map_species_terms([iri, unknown, "CMV", "CMV", ""], &lookup, false).await;
        assert_eq!(map.len(), 3);
        assert_eq!(map[iri].as_deref(), Some("Homo sapiens"));
        assert_eq!(map[unknown].as_deref(), Some(unknown));
        assert_eq!(map["CMV"].as_deref(), Some("Cytomegalovirus"));
    }

    #[tokio::test]
    async fn test_zooma_falls_back_to_local_term() {
        let lookup = MockLabelLookup::new().with_annotation("Cytomegalovirus", "Human betaherpesvirus 5");
        let map = map_species_terms(["CMV", "HomoSapiens"], &lookup, true).await;
        assert_eq!(map["CMV"].as_deref(), Some("Human betaherpesvirus 5"));
        assert_eq!(map["HomoSapiens"].as_deref(), Some("Homo sapiens"));
    }
}
