//! TRAIT (https://pgx.zju.edu.cn/trait/), TCR-pMHC pairs shipped as a
//! workbook inside a zip archive.

use iggytop_common::keys::*;

use super::{SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::reader::TableFormat;

pub const NAME: &str = "trait";
const URL: &str = "https://pgx.zju.edu.cn/download.trait/Interactive_TCR-pMHC_Pairs.zip_20250312.zip";

pub fn definition() -> SourceDefinition {
    SourceDefinition {
        renames: &[
            ("CDR3α", CHAIN_1_CDR3),
            ("CDR3β", CHAIN_2_CDR3),
            ("Epitope", EPITOPE),
            ("Epitope_gene", ANTIGEN),
            ("Epitope_species", ANTIGEN_ORGANISM),
            ("MHC_class", MHC_CLASS),
            ("MHC_A", MHC_GENE_1),
            ("MHC_B", MHC_GENE_2),
            ("TRAV", CHAIN_1_V_GENE),
            ("TRAJ", CHAIN_1_J_GENE),
            ("TRBV", CHAIN_2_V_GENE),
            ("TRBJ", CHAIN_2_J_GENE),
            ("Species", CHAIN_1_ORGANISM),
        ],
        constants: &[(CHAIN_1_TYPE, Some("tra")), (CHAIN_2_TYPE, Some("trb"))],
        copies: &[(CHAIN_1_ORGANISM, CHAIN_2_ORGANISM)],
        ..SourceDefinition::new(
            NAME,
            Asset::url("trait_latest", URL),
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
        let path = dir.path().join("Interactive_TCR-pMHC_Pairs.xlsx");
        write_test_xlsx(
            &path,
            &[
                vec![
                    "ID", "CDR3α", "CDR3β", "Epitope", "Epitope_gene", "Epitope_species", "MHC_class",
                    "MHC_A", "MHC_B", "TRAV", "TRAJ", "TRBV", "TRBJ", "Species",
                ],
                vec![
                    "1", "CAVRDGGSQGNLIF", "CASSPGQGAYEQYF", "YLQPRTFLL", "Spike", "SARS-CoV-2",
                    "MHCI", "HLA-A*02:01", "B2M", "TRAV12-1", "TRAJ42", "TRBV7-9", "TRBJ2-7",
                    "HomoSapiens",
                ],
            ],
        );

        let def = definition().with_local_path(&path);
        let table = def.prepare(def.load(&LocalFetcher).await.unwrap()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, CHAIN_1_CDR3), Some("CAVRDGGSQGNLIF"));
        assert_eq!(table.get(0, ANTIGEN_ORGANISM), Some("SARS-CoV-2"));
        assert_eq!(table.get(0, CHAIN_2_ORGANISM), Some("HomoSapiens"));
        assert_eq!(table.get(0, CHAIN_2_TYPE), Some("trb"));
        assert!(!table.has_column("ID"));
    }
}
