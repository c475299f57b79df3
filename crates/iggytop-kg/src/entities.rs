//! Node and edge tuples handed to graph assembly, plus typed views over them.

use std::collections::BTreeMap;

use iggytop_common::keys::EPITOPE_TYPE;
use iggytop_common::ChainType;
use serde::{Deserialize, Serialize};

/// Property map of a node or edge. Keys are canonical column names with the
/// chain prefix removed; `None` marks a missing value.
pub type Properties = BTreeMap<String, Option<String>>;

/// A graph node: a receptor chain (`tra`, `trb`, `igh`, `igl`) or an epitope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_type: String,
    pub properties: Properties,
}

/// A graph edge: chain-to-chain pairing or chain-to-epitope binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub properties: Properties,
}

impl Node {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_deref())
    }

    pub fn is_epitope(&self) -> bool {
        self.node_type == EPITOPE_TYPE
    }
}

impl Edge {
    /// True for chain-to-chain pairing edges.
    pub fn is_pairing(&self) -> bool {
        !self.edge_type.ends_with(&format!("_to_{EPITOPE_TYPE}"))
    }
}

/// One observed receptor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRecord {
    pub id: String,
    pub chain_type: ChainType,
    pub cdr3: String,
    pub v_gene: Option<String>,
    pub d_gene: Option<String>,
    pub j_gene: Option<String>,
    pub organism: Option<String>,
}

impl ChainRecord {
    /// Typed view of a chain node. `None` for epitope nodes, unknown chain
    /// types, or nodes without a CDR3.
    pub fn from_node(node: &Node) -> Option<Self> {
        let chain_type = node.node_type.parse::<ChainType>().ok()?;
        let owned = |key: &str| node.property(key).map(str::to_string);
        Some(Self {
            id: node.id.clone(),
            chain_type,
            cdr3: owned("cdr3")?,
            v_gene: owned("v_gene"),
            d_gene: owned("d_gene"),
            j_gene: owned("j_gene"),
            organism: owned("organism"),
        })
    }
}

/// One epitope target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpitopeRecord {
    pub id: String,
    pub sequence: Option<String>,
    pub iedb_id: Option<String>,
    pub antigen: Option<String>,
    pub antigen_organism: Option<String>,
    pub publication: Option<String>,
}

impl EpitopeRecord {
    pub fn from_node(node: &Node) -> Option<Self> {
        if !node.is_epitope() {
            return None;
        }
        let owned = |key: &str| node.property(key).map(str::to_string);
        Some(Self {
            id: node.id.clone(),
            sequence: owned("epitope_sequence"),
            iedb_id: owned("epitope_iedb_id"),
            antigen: owned("antigen_name"),
            antigen_organism: owned("antigen_organism"),
            publication: owned("publication"),
        })
    }

    /// Whether the external reference resolver found this epitope.
    pub fn is_resolved(&self) -> bool {
        self.iedb_id
            .as_deref()
            .map(|id| id.starts_with("iedb:"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Option<&str>)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_chain_record_from_node() {
        let node = Node {
            id: "trb:CASSLGTDTQYF:TRBV7-2".into(),
            node_type: "trb".into(),
            properties: props(&[
                ("cdr3", Some("CASSLGTDTQYF")),
                ("v_gene", Some("TRBV7-2")),
                ("j_gene", None),
            ]),
        };
        let rec = ChainRecord::from_node(&node).unwrap();
        assert_eq!(rec.chain_type, ChainType::Trb);
        assert_eq!(rec.v_gene.as_deref(), Some("TRBV7-2"));
        assert_eq!(rec.j_gene, None);
        assert!(EpitopeRecord::from_node(&node).is_none());
    }

    #[test]
    fn test_epitope_record_resolution() {
        let node = Node {
            id: "epitope:iedb:27".into(),
            node_type: "epitope".into(),
            properties: props(&[("epitope_iedb_id", Some("iedb:27"))]),
        };
        let rec = EpitopeRecord::from_node(&node).unwrap();
        assert!(rec.is_resolved());
        assert!(ChainRecord::from_node(&node).is_none());
    }

    #[test]
    fn test_edge_kind() {
        let edge = Edge {
            id: "a-b".into(),
            source_id: "a".into(),
            target_id: "b".into(),
            edge_type: "tra_to_trb".into(),
            properties: Properties::new(),
        };
        assert!(edge.is_pairing());
        let binding = Edge { edge_type: "trb_to_epitope".into(), ..edge };
        assert!(!binding.is_pairing());
    }
}
