//! Field normalisation.
//!
//! Each normaliser maps one raw field onto its canonical form:
//! - `sequence`: amino-acid validation, CDR3 motif repair, epitope cleaning
//! - `gene`: V/D/J gene names onto IMGT-style names without alleles
//! - `species`: free-text organisms onto canonical species names
//! - `antigen`: antigen names without bracketed annotations
//!
//! Normalisers that work on whole columns take the distinct values of the
//! column and return a lookup table, which the harmoniser then applies.

pub mod antigen;
pub mod gene;
pub mod sequence;
pub mod species;

pub use antigen::clean_antigen_names;
pub use gene::normalize_gene;
pub use sequence::{is_valid_epitope, is_valid_peptide, normalize_cdr3, normalize_epitope};
pub use species::{map_species_terms, normalize_species};
