//! iggytop-ingestion — Receptor/epitope source ingestion and harmonisation.
//! Covers:
//! - Source asset download and caching
//! - Tabular readers (CSV/TSV, two-row-header CSV, XLSX)
//! - Sequence, gene, species and antigen normalisation
//! - IEDB reference resolution (epitopes, publications)
//! - The seven source definitions and the generic adapter engine
//! - Sequential multi-source pipeline

pub mod cache;
pub mod download;
pub mod harmonize;
pub mod iedb;
pub mod normalise;
pub mod ontology;
pub mod pipeline;
pub mod reader;
pub mod sources;
