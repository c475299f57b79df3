//! Column-wise harmonisation of a renamed source table.
//!
//! Order matters and mirrors how the fields depend on each other:
//!   1. CDR3s of both chain slots (heavy chains close with W)
//!   2. epitope sequences
//!   3. V/D/J gene names
//!   4. IEDB reference ids for epitopes, back-filling antigen data
//!   5. organism names of the antigen and both chains
//!   6. antigen names
//!
//! Step 4 only touches rows that do not already carry a reference id, so a
//! source mixing IEDB IRIs with bare sequences keeps both.
//! Steps 4-6 work on the distinct values of a column and apply the resulting
//! lookup table, so external calls scale with distinct values, not rows.
//! Columns a source does not carry are skipped.

use std::collections::HashSet;

use iggytop_common::keys::{
    ChainColumns, ANTIGEN, ANTIGEN_ORGANISM, CHAIN_1, CHAIN_1_ORGANISM, CHAIN_2, CHAIN_2_ORGANISM,
    EPITOPE, EPITOPE_IEDB_ID,
};
use iggytop_common::table::Cell;
use iggytop_common::{ChainType, Table};
use serde::Serialize;
use tracing::{debug, info};

use crate::iedb::{resolve_epitopes, IedbApi, MatchStats, DEFAULT_CHUNK_SIZE};
use crate::normalise::{clean_antigen_names, map_species_terms, normalize_cdr3, normalize_epitope, normalize_gene};
use crate::ontology::LabelLookup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonizeOptions {
    /// Epitopes per IEDB request in the exact pass.
    pub chunk_size: usize,
    /// Ask Zooma for an organism annotation of every species term.
    pub zooma: bool,
}

impl Default for HarmonizeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            zooma: false,
        }
    }
}

/// What harmonisation changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarmonizeReport {
    /// Non-null CDR3s that failed validation and were nulled.
    pub cdr3_dropped: usize,
    /// Epitope resolution over the rows without a reference id of their own.
    pub epitope_stats: Option<MatchStats>,
    /// Rows whose antigen name/organism came from the resolver.
    pub antigens_backfilled: usize,
}

fn harmonize_cdr3(table: &mut Table, slot: &ChainColumns) -> usize {
    if !table.has_column(slot.cdr3) || !table.has_column(slot.chain_type) {
        return 0;
    }
    let mut dropped = 0;
    let values: Vec<Cell> = table
        .rows()
        .map(|row| {
            let raw = row.get(slot.cdr3)?;
            let heavy = row
                .get(slot.chain_type)
                .and_then(|t| t.parse::<ChainType>().ok())
                .is_some_and(|t| t.is_heavy());
            let normalized = normalize_cdr3(raw, heavy);
            if normalized.is_none() {
                dropped += 1;
            }
            normalized
        })
        .collect();
    let mut values = values.into_iter();
    table.map_column(slot.cdr3, |_| values.next().flatten());
    dropped
}

/// Attach `seq:`/`iedb:` reference ids to rows that lack one and fill in
/// their missing antigen data. `None` when every epitope row already has an id.
async fn resolve_references(table: &mut Table, iedb: &dyn IedbApi, chunk_size: usize) -> Option<(MatchStats, usize)> {
    let pending: Vec<usize> = table
        .rows()
        .enumerate()
        .filter(|(_, row)| row.get(EPITOPE).is_some() && row.get(EPITOPE_IEDB_ID).is_none())
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return None;
    }

    let epitopes: Vec<String> = {
        let mut seen = HashSet::new();
        pending
            .iter()
            .filter_map(|&i| table.get(i, EPITOPE))
            .filter(|e| seen.insert(*e))
            .map(String::from)
            .collect()
    };
    let resolution = resolve_epitopes(iedb, &epitopes, chunk_size).await;

    table.ensure_column(EPITOPE_IEDB_ID);
    table.ensure_column(ANTIGEN);
    table.ensure_column(ANTIGEN_ORGANISM);
    let mut backfilled = 0;
    for i in pending {
        let Some(reference) = table.get(i, EPITOPE).and_then(|e| resolution.reference(e)) else {
            continue;
        };
        table.set(i, EPITOPE_IEDB_ID, Some(reference.reference_id.clone()));

        if table.get(i, ANTIGEN).is_some() && table.get(i, ANTIGEN_ORGANISM).is_some() {
            continue;
        }
        let Some(antigen) = reference.antigen.clone() else {
            continue;
        };
        let organism = reference
            .organism
            .clone()
            .or_else(|| table.get(i, ANTIGEN_ORGANISM).map(String::from));
        table.set(i, ANTIGEN, Some(antigen));
        table.set(i, ANTIGEN_ORGANISM, organism);
        backfilled += 1;
    }
    Some((resolution.stats, backfilled))
}

/// Normalise every canonical column of `table` in place.
pub async fn harmonize_sequences(
    table: &mut Table,
    iedb: &dyn IedbApi,
    lookup: &dyn LabelLookup,
    options: &HarmonizeOptions,
) -> HarmonizeReport {
    let mut report = HarmonizeReport::default();

    for slot in [&CHAIN_1, &CHAIN_2] {
        report.cdr3_dropped += harmonize_cdr3(table, slot);
    }

    table.map_column(EPITOPE, |v| v.and_then(normalize_epitope));

    for slot in [&CHAIN_1, &CHAIN_2] {
        for column in slot.gene_columns() {
            table.map_column(column, |v| v.and_then(normalize_gene));
        }
    }

    match resolve_references(table, iedb, options.chunk_size).await {
        Some((stats, backfilled)) => {
            report.epitope_stats = Some(stats);
            report.antigens_backfilled = backfilled;
        }
        None => debug!("Every epitope already has a reference id, skipping resolution"),
    }

    for column in [ANTIGEN_ORGANISM, CHAIN_1_ORGANISM, CHAIN_2_ORGANISM] {
        if !table.has_column(column) {
            continue;
        }
        let mapping = map_species_terms(table.distinct(column), lookup, options.zooma).await;
        table.apply_mapping(column, &mapping);
    }

    if table.has_column(ANTIGEN) {
        let mapping = clean_antigen_names(table.distinct(ANTIGEN));
        table.apply_mapping(ANTIGEN, &mapping);
    }

    info!(
        rows = table.len(),
        cdr3_dropped = report.cdr3_dropped,
        antigens_backfilled = report.antigens_backfilled,
        "Harmonised table"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iedb::MockIedbApi;
    use crate::ontology::MockLabelLookup;
    use iggytop_common::keys::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    fn sample_table() -> Table {
        Table::from_rows(
            [
                CHAIN_1_TYPE, CHAIN_1_CDR3, CHAIN_1_V_GENE, CHAIN_1_ORGANISM,
                CHAIN_2_TYPE, CHAIN_2_CDR3, CHAIN_2_J_GENE, EPITOPE, ANTIGEN,
            ],
            vec![
                vec![s("tra"), s("avrf"), s("TCRAV12-3*01"), s("HomoSapiens"), s("trb"), s("CASSLGTDTQYF"), s("TRBJ2-3*01"), s("gilgfvftl+ox"), None],
                vec![s("igh"), s("ARDYW"), None, s("HomoSapiens"), s("igl"), s("CQQ1F"), None, s("NLVPMVATV"), s("pp65 [CMV]")],
            ],
        )
    }

    #[tokio::test]
    async fn test_harmonize_full_table() {
        let mut table = sample_table();
        let iedb = MockIedbApi::new().with_record(27, "GILGFVFTL", Some("Matrix protein 1 [flu]"), Some("Influenza A virus"));
        let report = harmonize_sequences(&mut table, &iedb, &MockLabelLookup::new(), &HarmonizeOptions::default()).await;

        assert_eq!(table.get(0, CHAIN_1_CDR3), Some("CAVRF"));
        assert_eq!(table.get(1, CHAIN_1_CDR3), Some("CARDYW"));
        assert_eq!(table.get(1, CHAIN_2_CDR3), None);
        assert_eq!(report.cdr3_dropped, 1);

        assert_eq!(table.get(0, CHAIN_1_V_GENE), Some("TRAV12-3"));
        assert_eq!(table.get(0, CHAIN_2_J_GENE), Some("TRBJ2-3"));
        assert_eq!(table.get(0, EPITOPE), Some("GILGFVFTL"));

        assert_eq!(table.get(0, EPITOPE_IEDB_ID), Some("iedb:27"));
        assert_eq!(table.get(1, EPITOPE_IEDB_ID), Some("seq:NLVPMVATV"));
        assert_eq!(report.epitope_stats, Some(MatchStats { matched: 1, total: 2 }));

        // Back-filled from IEDB, then cleaned like any other antigen name.
        assert_eq!(table.get(0, ANTIGEN), Some("Matrix protein 1"));
        assert_eq!(table.get(0, ANTIGEN_ORGANISM), Some("Influenza A virus"));
        assert_eq!(report.antigens_backfilled, 1);
        assert_eq!(table.get(1, ANTIGEN), Some("pp65"));

        assert_eq!(table.get(0, CHAIN_1_ORGANISM), Some("Homo sapiens"));
    }

    #[tokio::test]
    async fn test_existing_reference_ids_skip_resolution() {
        let mut table = Table::from_rows(
            [EPITOPE, EPITOPE_IEDB_ID],
            vec![vec![s("GILGFVFTL"), s("iedb:27")]],
        );
        let iedb = MockIedbApi::new();
        let report = harmonize_sequences(&mut table, &iedb, &MockLabelLookup::new(), &HarmonizeOptions::default()).await;
        assert!(iedb.calls().is_empty());
        assert_eq!(report.epitope_stats, None);
        assert!(!table.has_column(ANTIGEN));
    }

    #[tokio::test]
    async fn test_rows_without_reference_id_are_resolved() {
        let mut table = Table::from_rows(
            [EPITOPE, EPITOPE_IEDB_ID, ANTIGEN],
            vec![
                vec![s("GILGFVFTL"), s("iedb:27"), s("M1")],
                vec![s("NLVPMVATV"), None, None],
                vec![s("KLGGALQAK"), None, None],
            ],
        );
        let iedb = MockIedbApi::new().with_record(44, "NLVPMVATV", Some("pp65"), Some("Human betaherpesvirus 5"));
        let report = harmonize_sequences(&mut table, &iedb, &MockLabelLookup::new(), &HarmonizeOptions::default()).await;

        assert_eq!(table.get(0, EPITOPE_IEDB_ID), Some("iedb:27"));
        assert_eq!(table.get(0, ANTIGEN), Some("M1"));
        assert_eq!(table.get(1, EPITOPE_IEDB_ID), Some("iedb:44"));
        assert_eq!(table.get(1, ANTIGEN), Some("pp65"));
        assert_eq!(table.get(2, EPITOPE_IEDB_ID), Some("seq:KLGGALQAK"));
        assert_eq!(report.epitope_stats, Some(MatchStats { matched: 1, total: 2 }));
        assert_eq!(report.antigens_backfilled, 1);
        // Only the two rows without an id were sent.
        assert_eq!(iedb.calls()[0], (crate::iedb::MatchMode::Exact, 2));
    }

    #[tokio::test]
    async fn test_resolver_outage_keeps_rows() {
        let mut table = sample_table();
        let report = harmonize_sequences(
            &mut table,
            &MockIedbApi::failing(),
            &MockLabelLookup::new(),
            &HarmonizeOptions::default(),
        )
        .await;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, EPITOPE_IEDB_ID), Some("seq:GILGFVFTL"));
        assert_eq!(report.epitope_stats.map(|s| s.matched), Some(0));
        assert_eq!(table.get(0, ANTIGEN), None);
    }
}
