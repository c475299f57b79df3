//! NeoTCR (https://github.com/lyotvincent/NeoTCR), neoantigen-specific
//! human TCRs.

use iggytop_common::keys::*;

use super::{strip_pmid_prefix, SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::reader::TableFormat;

pub const NAME: &str = "neotcr";
const URL: &str = "https://github.com/lyotvincent/NeoTCR/raw/main/data/NeoTCR%20data-20221220.xlsx";

pub fn definition() -> SourceDefinition {
    SourceDefinition {
        null_tokens: &["nan", "n.a."],
        renames: &[
            ("TRA_CDR3", CHAIN_1_CDR3),
            ("TRAV", CHAIN_1_V_GENE),
            ("TRAJ", CHAIN_1_J_GENE),
            ("TRB_CDR3", CHAIN_2_CDR3),
            ("TRBV", CHAIN_2_V_GENE),
            ("TRBJ", CHAIN_2_J_GENE),
            ("Neoepitope", EPITOPE),
            ("Antigen", ANTIGEN),
            ("HLA Allele", MHC_GENE_1),
            ("PubMed ID", PUBLICATION),
        ],
        constants: &[
            (CHAIN_1_ORGANISM, Some("Homo sapiens")),
            (CHAIN_2_ORGANISM, Some("Homo sapiens")),
            (ANTIGEN_ORGANISM, Some("Homo sapiens")),
            (CHAIN_1_TYPE, Some("tra")),
            (CHAIN_2_TYPE, Some("trb")),
        ],
        explode: Some((EPITOPE, ',')),
        transform: Some(strip_pmid_prefix),
        ..SourceDefinition::new(
            NAME,
            Asset::url("neotcr_latest", URL),
            vec![SourceFile::first(TableFormat::Xlsx)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalFetcher;
    use crate::reader::write_test_xlsx;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_prepare_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NeoTCR data-20221220.xlsx");
        write_test_xlsx(
            &path,
            &[
                vec![
                    "TRA_CDR3", "TRAV", "TRAJ", "TRB_CDR3", "TRBV", "TRBJ", "Neoepitope", "Antigen",
                    "HLA Allele", "PubMed ID",
                ],
                vec![
                    "CAVSDNYQLIW", "TRAV8-3", "TRAJ33", "CASSLGQAYEQYF", "TRBV7-2", "TRBJ2-7",
                    "KLVVVGADGV,KLVVVGAVGV", "KRAS", "HLA-A*11:01", "PMID:31043525",
                ],
                vec!["n.a.", "", "", "CASSF", "", "", "SPQGRAVLL", "", "", "n.a."],
            ],
        );

        let def = definition().with_local_path(&path);
        let table = def.prepare(def.load(&LocalFetcher).await.unwrap()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1, EPITOPE), Some("KLVVVGAVGV"));
        assert_eq!(table.get(1, ANTIGEN), Some("KRAS"));
        assert_eq!(table.get(0, PUBLICATION), Some("31043525"));
        assert_eq!(table.get(2, PUBLICATION), None);
        assert_eq!(table.get(2, CHAIN_1_CDR3), None);
        assert_eq!(table.get(2, ANTIGEN_ORGANISM), Some("Homo sapiens"));
    }
}
