//! TCR3d (https://tcr3d.ibbr.umd.edu/), TCR-pMHC complexes with solved
//! structures. J genes and the antigen organism are not reported.

use iggytop_common::keys::*;

use super::{SourceDefinition, SourceFile};
use crate::download::Asset;
use crate::reader::TableFormat;

pub const NAME: &str = "tcr3d";
const URL: &str = "https://tcr3d.ibbr.umd.edu/static/download/tcr_complexes_data.tsv";

pub fn definition() -> SourceDefinition {
    SourceDefinition {
        null_tokens: &["nan", "n.a.", "null"],
        renames: &[
            ("CDR3_alpha", CHAIN_1_CDR3),
            ("TRAV_gene", CHAIN_1_V_GENE),
            ("CDR3_beta", CHAIN_2_CDR3),
            ("TRBV_gene", CHAIN_2_V_GENE),
            ("Epitope", EPITOPE),
            ("MHC_allele", MHC_GENE_1),
            ("TCR_organism", CHAIN_1_ORGANISM),
            ("Pubmed", PUBLICATION),
        ],
        constants: &[
            (CHAIN_1_TYPE, Some("tra")),
            (CHAIN_2_TYPE, Some("trb")),
            (CHAIN_1_J_GENE, None),
            (CHAIN_2_J_GENE, None),
            (ANTIGEN_ORGANISM, None),
        ],
        copies: &[(CHAIN_1_ORGANISM, CHAIN_2_ORGANISM)],
        explode: Some((EPITOPE, ',')),
        ..SourceDefinition::new(
            NAME,
            Asset::url("tcr3d_latest", URL),
            vec![SourceFile::first(TableFormat::Tsv)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalFetcher;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_multi_epitope_rows_are_exploded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tcr_complexes_data.tsv");
        std::fs::write(
            &path,
            "PDB_ID\tCDR3_alpha\tTRAV_gene\tCDR3_beta\tTRBV_gene\tEpitope\tMHC_allele\tTCR_organism\tPubmed\n\
             1ao7\tCAVTTDSWGKLQF\tTRAV12-2\tCASRPGLAGGRPEQYF\tTRBV6-5\tLLFGYPVYV,LLFGYAVYV\tHLA-A*02:01\tHuman\t8906788\n\
             2bnr\tn.a.\tTRAV21\tCASSYVGNTGELFF\tnull\tSLLMWITQC\tHLA-A*02:01\tHuman\tnan\n",
        )
        .unwrap();

        let def = definition().with_local_path(&path);
        let table = def.prepare(def.load(&LocalFetcher).await.unwrap()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0, EPITOPE), Some("LLFGYPVYV"));
        assert_eq!(table.get(1, EPITOPE), Some("LLFGYAVYV"));
        assert_eq!(table.get(1, CHAIN_2_CDR3), Some("CASRPGLAGGRPEQYF"));
        assert_eq!(table.get(2, CHAIN_1_CDR3), None);
        assert_eq!(table.get(2, CHAIN_2_V_GENE), None);
        assert_eq!(table.get(2, PUBLICATION), None);
        assert!(table.has_column(CHAIN_1_J_GENE));
        assert_eq!(table.get(0, CHAIN_1_J_GENE), None);
        assert_eq!(table.get(0, CHAIN_2_ORGANISM), Some("Human"));
    }
}
