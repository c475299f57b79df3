//! McPAS-TCR (http://friedmanlab.weizmann.ac.il/McPAS-TCR/).
//!
//! There is no stable download URL; the export has to be saved locally
//! (default `data/mcpas_full.csv`). It is not UTF-8 clean.

use iggytop_common::keys::*;

use super::{SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::reader::TableFormat;

pub const NAME: &str = "mcpas";
pub const DEFAULT_PATH: &str = "data/mcpas_full.csv";

pub fn definition() -> SourceDefinition {
    SourceDefinition {
        renames: &[
            ("CDR3.alpha.aa", CHAIN_1_CDR3),
            ("CDR3.beta.aa", CHAIN_2_CDR3),
            ("Epitope.peptide", EPITOPE),
            ("TRAV", CHAIN_1_V_GENE),
            ("TRAJ", CHAIN_1_J_GENE),
            ("TRBV", CHAIN_2_V_GENE),
            ("TRBD", CHAIN_2_D_GENE),
            ("TRBJ", CHAIN_2_J_GENE),
            ("Species", CHAIN_1_ORGANISM),
            ("Antigen.protein", ANTIGEN),
            ("MHC", MHC_GENE_1),
            ("PubMed.ID", PUBLICATION),
        ],
        constants: &[(CHAIN_1_TYPE, Some("tra")), (CHAIN_2_TYPE, Some("trb"))],
        copies: &[(CHAIN_1_ORGANISM, CHAIN_2_ORGANISM)],
        ..SourceDefinition::new(
            NAME,
            Asset::local(DEFAULT_PATH),
            vec![SourceFile::first(TableFormat::Csv)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalFetcher;
    use pretty_assertions::assert_eq;

    const EXPORT: &str = "CDR3.alpha.aa,CDR3.beta.aa,Species,Category,Pathology,Antigen.protein,Epitope.peptide,MHC,TRAV,TRAJ,TRBV,TRBD,TRBJ,PubMed.ID\n\
        CAVNDYKLSF,CASSIRSSYEQYF,Human,Pathogens,Influenza,Matrix protein (M1),GILGFVFTL,HLA-A*02:01,TRAV12-2,TRAJ20,TRBV19,,TRBJ2-7,12345\n\
        ,CASSPQGLGTEAFF,Mouse,Autoimmune,Diabetes,,,,,,TRBV13-2,TRBD1,TRBJ1-1,nan\n";

    #[tokio::test]
    async fn test_load_and_prepare_local_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpas_full.csv");
        std::fs::write(&path, EXPORT).unwrap();

        let def = definition().with_local_path(&path);
        let raw = def.load(&LocalFetcher).await.unwrap();
        let table = def.prepare(raw).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, CHAIN_1_CDR3), Some("CAVNDYKLSF"));
        assert_eq!(table.get(0, CHAIN_2_ORGANISM), Some("Human"));
        assert_eq!(table.get(1, CHAIN_1_CDR3), None);
        assert_eq!(table.get(1, CHAIN_2_D_GENE), Some("TRBD1"));
        assert_eq!(table.get(1, PUBLICATION), None);
        assert!(!table.has_column("Pathology"));
    }

    #[tokio::test]
    async fn test_missing_local_export() {
        let def = definition().with_local_path("/nonexistent/mcpas_full.csv");
        assert!(def.load(&LocalFetcher).await.is_err());
    }
}
