//! IEDB receptor export (https://www.iedb.org/).
//!
//! CEDAR publishes the same `receptor_full_v3` layout, so both sources are
//! built by [`receptor_export`]. The archive holds a TCR and a BCR table with
//! two header rows each. Curated CDR3/gene calls win over calculated ones,
//! epitope IRIs become `iedb:` ids (rows without one are resolved by
//! sequence), and references are IEDB IRIs resolved to PubMed ids.

use iggytop_common::keys::*;
use iggytop_common::{Result, Table};

use super::{SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::iedb::reference_id;
use crate::reader::TableFormat;

pub const NAME: &str = "iedb";
const URL: &str = "https://www.iedb.org/downloader.php?file_name=doc/receptor_full_v3.zip";

pub const TCR_FILE: &str = "tcr_full_v3.csv";
pub const BCR_FILE: &str = "bcr_full_v3.csv";

/// `(merged, curated, calculated)` column names per chain field.
const PRECEDENCE: [(&str, &str, &str); 8] = [
    ("Chain 1 CDR3", "Chain 1 CDR3 Curated", "Chain 1 CDR3 Calculated"),
    ("Chain 1 V Gene", "Chain 1 Curated V Gene", "Chain 1 Calculated V Gene"),
    ("Chain 1 D Gene", "Chain 1 Curated D Gene", "Chain 1 Calculated D Gene"),
    ("Chain 1 J Gene", "Chain 1 Curated J Gene", "Chain 1 Calculated J Gene"),
    ("Chain 2 CDR3", "Chain 2 CDR3 Curated", "Chain 2 CDR3 Calculated"),
    ("Chain 2 V Gene", "Chain 2 Curated V Gene", "Chain 2 Calculated V Gene"),
    ("Chain 2 D Gene", "Chain 2 Curated D Gene", "Chain 2 Calculated D Gene"),
    ("Chain 2 J Gene", "Chain 2 Curated J Gene", "Chain 2 Calculated J Gene"),
];

pub fn definition() -> SourceDefinition {
    receptor_export(NAME, Asset::url("iedb_latest", URL))
}

/// Definition of a `receptor_full_v3` export.
pub fn receptor_export(name: &'static str, asset: Asset) -> SourceDefinition {
    SourceDefinition {
        reshape: Some(prefer_curated),
        renames: &[
            ("Epitope Name", EPITOPE),
            ("Epitope IEDB IRI", EPITOPE_IEDB_ID),
            ("Epitope Source Molecule", ANTIGEN),
            ("Epitope Source Organism", ANTIGEN_ORGANISM),
            ("Reference IEDB IRI", PUBLICATION),
            ("Chain 1 CDR3", CHAIN_1_CDR3),
            ("Chain 1 V Gene", CHAIN_1_V_GENE),
            ("Chain 1 D Gene", CHAIN_1_D_GENE),
            ("Chain 1 J Gene", CHAIN_1_J_GENE),
            ("Chain 1 Organism IRI", CHAIN_1_ORGANISM),
            ("Chain 2 CDR3", CHAIN_2_CDR3),
            ("Chain 2 V Gene", CHAIN_2_V_GENE),
            ("Chain 2 D Gene", CHAIN_2_D_GENE),
            ("Chain 2 J Gene", CHAIN_2_J_GENE),
            ("Chain 2 Organism IRI", CHAIN_2_ORGANISM),
        ],
        transform: Some(epitope_iris_to_ids),
        resolve_publications: true,
        ..SourceDefinition::new(
            name,
            asset,
            vec![
                SourceFile::named(TCR_FILE, TableFormat::TwoRowHeaderCsv)
                    .with_constants(&[(CHAIN_1_TYPE, "tra"), (CHAIN_2_TYPE, "trb")]),
                SourceFile::named(BCR_FILE, TableFormat::TwoRowHeaderCsv)
                    .with_constants(&[(CHAIN_1_TYPE, "igh"), (CHAIN_2_TYPE, "igl")]),
            ],
        )
    }
}

/// Collapse each curated/calculated column pair into one column, curated
/// first. The CDR3 columns must exist in one of the two forms.
fn prefer_curated(mut raw: Table) -> Result<Table> {
    for (merged, curated, calculated) in PRECEDENCE {
        if merged.ends_with("CDR3") && !raw.has_column(calculated) {
            raw.require(NAME, curated)?;
        }
        raw.derive_column(merged, |row| {
            row.get(curated).or_else(|| row.get(calculated)).map(str::to_string)
        });
    }
    Ok(raw)
}

/// `http://www.iedb.org/epitope/69921` → `iedb:69921`.
fn epitope_iris_to_ids(table: &mut Table) {
    table.map_column(EPITOPE_IEDB_ID, |iri| {
        iri.and_then(reference_id).map(|id| format!("iedb:{id}"))
    });
}

/// A two-row-header receptor export containing only the given cells.
#[cfg(test)]
pub(crate) fn export_csv(rows: &[&[(&str, &str)]]) -> String {
    let mut columns = vec![
        ("Reference", "IEDB IRI"),
        ("Epitope", "IEDB IRI"),
        ("Epitope", "Name"),
        ("Epitope", "Source Molecule"),
        ("Epitope", "Source Organism"),
    ];
    for chain in ["Chain 1", "Chain 2"] {
        for field in [
            "Organism IRI",
            "Curated V Gene",
            "Calculated V Gene",
            "Curated D Gene",
            "Calculated D Gene",
            "Curated J Gene",
            "Calculated J Gene",
            "CDR3 Curated",
            "CDR3 Calculated",
        ] {
            columns.push((chain, field));
        }
    }

    let mut csv = String::new();
    for line in [
        columns.iter().map(|(g, _)| *g).collect::<Vec<_>>(),
        columns.iter().map(|(_, f)| *f).collect::<Vec<_>>(),
    ] {
        csv.push_str(&line.join(","));
        csv.push('\n');
    }
    for row in rows {
        let values: Vec<&str> = columns
            .iter()
            .map(|(g, f)| {
                let column = format!("{g} {f}");
                row.iter().find(|(k, _)| *k == column).map_or("", |(_, v)| *v)
            })
            .collect();
        csv.push_str(&values.join(","));
        csv.push('\n');
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalFetcher;
    use crate::iedb::MockIedbApi;
    use crate::ontology::MockLabelLookup;
    use crate::sources::{RunOptions, Services};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_receptor_export_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let tcr = export_csv(&[&[
            ("Reference IEDB IRI", "http://www.iedb.org/reference/1004539"),
            ("Epitope IEDB IRI", "http://www.iedb.org/epitope/69921"),
            ("Epitope Name", "VMAPRTLIL"),
            ("Epitope Source Organism", "Homo sapiens (human)"),
            ("Chain 1 Organism IRI", "http://purl.obolibrary.org/obo/NCBITaxon_9606"),
            ("Chain 1 Calculated V Gene", "TRAV26-1*01"),
            ("Chain 1 CDR3 Calculated", "IVVRSSNTGKLI"),
            ("Chain 2 Curated V Gene", "TRBV14*01"),
            ("Chain 2 Calculated V Gene", "TRBV14*02"),
            ("Chain 2 CDR3 Curated", "ASSQDRDTQY"),
            ("Chain 2 CDR3 Calculated", "ASSQDRDTQYF"),
        ]]);
        let bcr = export_csv(&[&[
            ("Epitope Name", "NLVPMVATV"),
            ("Chain 1 CDR3 Curated", "ARDYW"),
        ]]);
        std::fs::write(dir.path().join(TCR_FILE), tcr).unwrap();
        std::fs::write(dir.path().join(BCR_FILE), bcr).unwrap();

        let def = definition().with_local_path(dir.path());
        let table = def.prepare(def.load(&LocalFetcher).await.unwrap()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, CHAIN_1_TYPE), Some("tra"));
        assert_eq!(table.get(1, CHAIN_1_TYPE), Some("igh"));
        assert_eq!(table.get(1, CHAIN_2_TYPE), Some("igl"));

        assert_eq!(table.get(0, CHAIN_1_V_GENE), Some("TRAV26-1*01"));
        assert_eq!(table.get(0, CHAIN_1_CDR3), Some("IVVRSSNTGKLI"));
        assert_eq!(table.get(0, CHAIN_2_V_GENE), Some("TRBV14*01"));
        assert_eq!(table.get(0, CHAIN_2_CDR3), Some("ASSQDRDTQY"));

        assert_eq!(table.get(0, EPITOPE_IEDB_ID), Some("iedb:69921"));
        assert_eq!(table.get(1, EPITOPE_IEDB_ID), None);
        assert_eq!(table.get(0, PUBLICATION), Some("http://www.iedb.org/reference/1004539"));
        assert!(def.resolve_publications);
    }

    #[tokio::test]
    async fn test_epitope_without_iri_keeps_its_node() {
        let dir = tempfile::tempdir().unwrap();
        let tcr = export_csv(&[
            &[
                ("Epitope IEDB IRI", "http://www.iedb.org/epitope/69921"),
                ("Epitope Name", "VMAPRTLIL"),
                ("Chain 2 CDR3 Curated", "CASSQDRDTQYF"),
            ],
            &[
                ("Epitope Name", "NLVPMVATV"),
                ("Chain 2 CDR3 Curated", "CASSLGTDTQYF"),
            ],
        ]);
        std::fs::write(dir.path().join(TCR_FILE), tcr).unwrap();
        std::fs::write(dir.path().join(BCR_FILE), export_csv(&[])).unwrap();

        let iedb = MockIedbApi::new();
        let lookup = MockLabelLookup::new();
        let services = Services {
            fetcher: &LocalFetcher,
            iedb: &iedb,
            lookup: &lookup,
        };
        let output = definition()
            .with_local_path(dir.path())
            .run(&services, &RunOptions::default())
            .await
            .unwrap();

        let node_ids: Vec<&str> = output.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(node_ids.contains(&"epitope:iedb:69921"));
        assert!(node_ids.contains(&"epitope:seq:NLVPMVATV"));
        assert!(output
            .edges
            .iter()
            .any(|e| e.source_id == "trb:CASSLGTDTQYF" && e.target_id == "epitope:seq:NLVPMVATV"));
        // Only the row without an IRI went to the resolver.
        assert_eq!(output.harmonize.epitope_stats.map(|s| s.total), Some(1));
    }

    #[test]
    fn test_missing_cdr3_columns_is_schema_drift() {
        let raw = Table::from_rows(["Epitope Name"], vec![vec![Some("GILGFVFTL".to_string())]]);
        assert!(prefer_curated(raw).is_err());
    }
}
