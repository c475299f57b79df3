//! VDJdb (https://vdjdb.cdr3.net/).
//!
//! The export has one row per chain. Chains of the same receptor share a
//! non-zero `complex.id`; those are joined into one paired row, everything
//! else becomes a single-chain row.

use std::collections::{HashMap, HashSet};

use iggytop_common::keys::*;
use iggytop_common::table::{Cell, Row};
use iggytop_common::{Result, Table};
use tracing::debug;

use super::{strip_pmid_prefix, SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::reader::TableFormat;

pub const NAME: &str = "vdjdb";
const REPO: &str = "antigenomics/vdjdb-db";
const FILE: &str = "vdjdb.txt";

const COMPLEX_ID: &str = "complex.id";
const GENE: &str = "gene";
/// Per-chain columns moved into the `_chain_1`/`_chain_2` slots.
const CHAIN_FIELDS: [&str; 3] = ["cdr3", "v.segm", "j.segm"];
/// Both chains of a pair must agree on these.
const MERGE_ON: [&str; 8] = [
    COMPLEX_ID,
    "antigen.epitope",
    "antigen.gene",
    "antigen.species",
    "mhc.class",
    "mhc.a",
    "mhc.b",
    "reference.id",
];

pub fn definition() -> SourceDefinition {
    SourceDefinition {
        reshape: Some(unpivot_pairs),
        renames: &[
            ("cdr3_chain_1", CHAIN_1_CDR3),
            ("v.segm_chain_1", CHAIN_1_V_GENE),
            ("j.segm_chain_1", CHAIN_1_J_GENE),
            ("cdr3_chain_2", CHAIN_2_CDR3),
            ("v.segm_chain_2", CHAIN_2_V_GENE),
            ("j.segm_chain_2", CHAIN_2_J_GENE),
            ("species", CHAIN_1_ORGANISM),
            ("antigen.epitope", EPITOPE),
            ("antigen.gene", ANTIGEN),
            ("antigen.species", ANTIGEN_ORGANISM),
            ("reference.id", PUBLICATION),
            ("mhc.class", MHC_CLASS),
            ("mhc.a", MHC_GENE_1),
            ("mhc.b", MHC_GENE_2),
        ],
        constants: &[(CHAIN_1_TYPE, Some("tra")), (CHAIN_2_TYPE, Some("trb"))],
        copies: &[(CHAIN_1_ORGANISM, CHAIN_2_ORGANISM)],
        transform: Some(strip_pmid_prefix),
        ..SourceDefinition::new(
            NAME,
            Asset::github_latest_release("vdjdb_latest", REPO),
            vec![SourceFile::named(FILE, TableFormat::Tsv)],
        )
    }
}

fn slot_column(field: &str, slot: u8) -> String {
    format!("{field}_chain_{slot}")
}

fn is_paired_complex(id: Option<&str>) -> bool {
    id.map(str::trim).is_some_and(|id| !id.is_empty() && id != "0")
}

/// Join TRA/TRB rows of complete complexes into paired rows; all other TRA
/// and TRB rows become single-chain rows. Rows of any other gene are dropped.
pub fn unpivot_pairs(raw: Table) -> Result<Table> {
    for column in [COMPLEX_ID, GENE].iter().chain(&CHAIN_FIELDS) {
        raw.require(NAME, column)?;
    }

    // Genes seen per complex and how often each complex occurs.
    let mut complexes: HashMap<&str, (usize, HashSet<&str>)> = HashMap::new();
    for row in raw.rows() {
        let id = row.get(COMPLEX_ID);
        if !is_paired_complex(id) {
            continue;
        }
        let entry = complexes.entry(id.unwrap_or_default()).or_default();
        entry.0 += 1;
        if let Some(gene) = row.get(GENE) {
            entry.1.insert(gene);
        }
    }
    let complete: HashSet<&str> = complexes
        .iter()
        .filter(|(_, (count, genes))| *count > 1 && genes.contains("TRA") && genes.contains("TRB"))
        .map(|(id, _)| *id)
        .collect();

    let base: Vec<&str> = raw
        .columns()
        .iter()
        .map(String::as_str)
        .filter(|c| !CHAIN_FIELDS.contains(c))
        .collect();
    let mut columns: Vec<String> = base.iter().map(|c| c.to_string()).collect();
    for slot in [1, 2] {
        columns.extend(CHAIN_FIELDS.iter().map(|f| slot_column(f, slot)));
    }
    let mut out = Table::new(columns);

    let build = |shared: Row<'_>, tra: Option<Row<'_>>, trb: Option<Row<'_>>| -> Vec<Cell> {
        let mut values: Vec<Cell> = base.iter().map(|c| shared.get(c).map(str::to_string)).collect();
        for chain in [tra, trb] {
            values.extend(
                CHAIN_FIELDS
                    .iter()
                    .map(|f| chain.and_then(|r| r.get(f)).map(str::to_string)),
            );
        }
        values
    };

    // Paired rows, in order of each complex's first TRA row.
    let in_complete = |row: &Row<'_>| row.get(COMPLEX_ID).is_some_and(|id| complete.contains(id));
    let trb_rows: Vec<Row<'_>> = raw
        .rows()
        .filter(|r| in_complete(r) && r.get(GENE) == Some("TRB"))
        .collect();
    let mut paired = 0;
    for tra in raw.rows().filter(|r| in_complete(r) && r.get(GENE) == Some("TRA")) {
        for trb in trb_rows
            .iter()
            .filter(|trb| MERGE_ON.iter().all(|c| trb.get(c) == tra.get(c)))
        {
            out.push_row(build(tra, Some(tra), Some(*trb)));
            paired += 1;
        }
    }

    let mut single = 0;
    for gene in ["TRA", "TRB"] {
        for row in raw.rows().filter(|r| !in_complete(r) && r.get(GENE) == Some(gene)) {
            let values = if gene == "TRA" {
                build(row, Some(row), None)
            } else {
                build(row, None, Some(row))
            };
            out.push_row(values);
            single += 1;
        }
    }

    debug!(raw_rows = raw.len(), paired, single, "Unpivoted VDJdb chains");
    Ok(out)
}
