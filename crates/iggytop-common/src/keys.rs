//! Canonical column names and the receptor chain vocabulary.
//!
//! Every source table is renamed onto these keys before harmonisation, so the
//! normalisers and the graph generator only ever see one schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const EPITOPE: &str = "epitope_sequence";
pub const EPITOPE_IEDB_ID: &str = "epitope_iedb_id";
pub const ANTIGEN: &str = "antigen_name";
pub const ANTIGEN_ORGANISM: &str = "antigen_organism";
pub const PUBLICATION: &str = "publication";

pub const MHC_CLASS: &str = "mhc_class";
pub const MHC_GENE_1: &str = "mhc_gene_1";
pub const MHC_GENE_2: &str = "mhc_gene_2";

pub const CHAIN_1_TYPE: &str = "chain_1_type";
pub const CHAIN_1_CDR3: &str = "chain_1_cdr3";
pub const CHAIN_1_V_GENE: &str = "chain_1_v_gene";
pub const CHAIN_1_D_GENE: &str = "chain_1_d_gene";
pub const CHAIN_1_J_GENE: &str = "chain_1_j_gene";
pub const CHAIN_1_ORGANISM: &str = "chain_1_organism";

pub const CHAIN_2_TYPE: &str = "chain_2_type";
pub const CHAIN_2_CDR3: &str = "chain_2_cdr3";
pub const CHAIN_2_V_GENE: &str = "chain_2_v_gene";
pub const CHAIN_2_D_GENE: &str = "chain_2_d_gene";
pub const CHAIN_2_J_GENE: &str = "chain_2_j_gene";
pub const CHAIN_2_ORGANISM: &str = "chain_2_organism";

/// Node type used for everything that is not a receptor chain.
pub const EPITOPE_TYPE: &str = "epitope";

/// Column prefixes stripped from property keys ("chain_1_v_gene" → "v_gene").
pub const CHAIN_PREFIXES: [&str; 2] = ["chain_1_", "chain_2_"];

/// The columns describing one chain slot of a receptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainColumns {
    pub chain_type: &'static str,
    pub cdr3: &'static str,
    pub v_gene: &'static str,
    pub d_gene: &'static str,
    pub j_gene: &'static str,
    pub organism: &'static str,
}

pub const CHAIN_1: ChainColumns = ChainColumns {
    chain_type: CHAIN_1_TYPE,
    cdr3: CHAIN_1_CDR3,
    v_gene: CHAIN_1_V_GENE,
    d_gene: CHAIN_1_D_GENE,
    j_gene: CHAIN_1_J_GENE,
    organism: CHAIN_1_ORGANISM,
};

pub const CHAIN_2: ChainColumns = ChainColumns {
    chain_type: CHAIN_2_TYPE,
    cdr3: CHAIN_2_CDR3,
    v_gene: CHAIN_2_V_GENE,
    d_gene: CHAIN_2_D_GENE,
    j_gene: CHAIN_2_J_GENE,
    organism: CHAIN_2_ORGANISM,
};

impl ChainColumns {
    pub fn gene_columns(&self) -> [&'static str; 3] {
        [self.v_gene, self.d_gene, self.j_gene]
    }
}

/// Receptor chain types. Chain 1 is alpha/heavy, chain 2 is beta/light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Tra,
    Trb,
    Igh,
    Igl,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Tra => "tra",
            ChainType::Trb => "trb",
            ChainType::Igh => "igh",
            ChainType::Igl => "igl",
        }
    }

    /// Heavy chains close their CDR3 with W (or F) instead of F.
    pub fn is_heavy(&self) -> bool {
        matches!(self, ChainType::Igh)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tra" | "alpha" => Ok(ChainType::Tra),
            "trb" | "beta" => Ok(ChainType::Trb),
            "igh" | "heavy" => Ok(ChainType::Igh),
            "igl" | "igk" | "light" => Ok(ChainType::Igl),
            other => Err(format!("unknown chain type '{other}'")),
        }
    }
}
