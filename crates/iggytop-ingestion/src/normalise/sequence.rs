//! Amino-acid sequence validation and repair.
//!
//! CDR3s are stored in their junction form: a leading conserved cysteine and a
//! trailing phenylalanine (tryptophan for heavy chains). Sources disagree on
//! whether those anchors are included, so `normalize_cdr3` re-adds them when
//! missing. Anything that is not a clean amino-acid string is dropped rather
//! than repaired.

const AMINO_ACIDS: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

fn is_amino_acid_string(seq: &str) -> bool {
    seq.bytes().all(|b| AMINO_ACIDS.contains(&b))
}

/// True iff `seq` is longer than two residues and uses only the 20 standard
/// amino acids (uppercase).
pub fn is_valid_peptide(seq: &str) -> bool {
    seq.len() > 2 && is_amino_acid_string(seq)
}

/// Looser check used for epitopes: any non-empty standard amino-acid string.
pub fn is_valid_epitope(seq: &str) -> bool {
    !seq.is_empty() && is_amino_acid_string(seq)
}

fn strip_whitespace(seq: &str) -> String {
    seq.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Canonical CDR3 junction, or `None` if the input is not a valid sequence.
///
/// ```ignore
/// assert_eq!(normalize_cdr3("assltdtqy", false).as_deref(), Some("CASSLTDTQYF"));
/// assert_eq!(normalize_cdr3("ARDYW", true).as_deref(), Some("CARDYW"));
/// ```
pub fn normalize_cdr3(seq: &str, is_heavy_chain: bool) -> Option<String> {
    let seq = strip_whitespace(&seq.to_uppercase());
    if !is_valid_peptide(&seq) {
        return None;
    }

    let ends_ok = seq.ends_with('F') || (is_heavy_chain && seq.ends_with('W'));
    if seq.starts_with('C') && ends_ok {
        return Some(seq);
    }

    let core = seq.trim_start_matches('C');
    let (core, terminal) = if is_heavy_chain {
        (core.trim_end_matches(['F', 'W']), 'W')
    } else {
        (core.trim_end_matches('F'), 'F')
    };
    let repaired = format!("C{core}{terminal}");

    // A bare "CF"/"CW" carries no sequence and would not survive re-normalisation.
    if repaired.len() <= 2 {
        return None;
    }
    Some(repaired)
}

/// Epitope sequence without trailing "+" annotations or whitespace, uppercased.
pub fn normalize_epitope(seq: &str) -> Option<String> {
    let head = seq.split('+').next().unwrap_or_default();
    let cleaned = strip_whitespace(&head.to_uppercase());
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
