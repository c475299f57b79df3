//! In-memory graph assembly.
//!
//! Node and edge streams from every source are merged by id. When the same id
//! arrives twice, the first non-null value of each property wins, so a later
//! source can fill gaps but never overwrite.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::info;

use crate::entities::{ChainRecord, Edge, EpitopeRecord, Node, Properties};

#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: Vec<Node>,
    node_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<String, usize>,
}

/// Per-type node and edge counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub pairing_edges: usize,
    pub binding_edges: usize,
    /// Chains whose id carries a V gene.
    pub chains_with_v_gene: usize,
    /// Epitopes with an IEDB id rather than a `seq:` sentinel.
    pub resolved_epitopes: usize,
    pub dangling_edges: usize,
}

impl GraphSummary {
    pub fn node_count(&self) -> usize {
        self.nodes_by_type.values().sum()
    }

    pub fn edge_count(&self) -> usize {
        self.edges_by_type.values().sum()
    }
}

fn merge_properties(existing: &mut Properties, incoming: Properties) {
    for (key, value) in incoming {
        let slot = existing.entry(key).or_insert(None);
        if slot.is_none() {
            *slot = value;
        }
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge nodes in. Returns how many ids were new.
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) -> usize {
        let mut added = 0;
        for node in nodes {
            match self.node_index.get(&node.id) {
                Some(&idx) => merge_properties(&mut self.nodes[idx].properties, node.properties),
                None => {
                    self.node_index.insert(node.id.clone(), self.nodes.len());
                    self.nodes.push(node);
                    added += 1;
                }
            }
        }
        added
    }

    /// Merge edges in. Returns how many ids were new.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = Edge>) -> usize {
        let mut added = 0;
        for edge in edges {
            match self.edge_index.get(&edge.id) {
                Some(&idx) => merge_properties(&mut self.edges[idx].properties, edge.properties),
                None => {
                    self.edge_index.insert(edge.id.clone(), self.edges.len());
                    self.edges.push(edge);
                    added += 1;
                }
            }
        }
        added
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&idx| &self.edges[idx])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Typed view of every chain node.
    pub fn chains(&self) -> impl Iterator<Item = ChainRecord> + '_ {
        self.nodes.iter().filter_map(ChainRecord::from_node)
    }

    /// Typed view of every epitope node.
    pub fn epitopes(&self) -> impl Iterator<Item = EpitopeRecord> + '_ {
        self.nodes.iter().filter_map(EpitopeRecord::from_node)
    }

    pub fn summary(&self) -> GraphSummary {
        let mut summary = GraphSummary::default();
        for node in &self.nodes {
            *summary.nodes_by_type.entry(node.node_type.clone()).or_default() += 1;
        }
        for edge in &self.edges {
            *summary.edges_by_type.entry(edge.edge_type.clone()).or_default() += 1;
            if edge.is_pairing() {
                summary.pairing_edges += 1;
            } else {
                summary.binding_edges += 1;
            }
            if !self.node_index.contains_key(&edge.source_id)
                || !self.node_index.contains_key(&edge.target_id)
            {
                summary.dangling_edges += 1;
            }
        }
        summary.chains_with_v_gene = self.chains().filter(|c| c.v_gene.is_some()).count();
        summary.resolved_epitopes = self.epitopes().filter(EpitopeRecord::is_resolved).count();
        summary
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!(
            nodes = summary.node_count(),
            edges = summary.edge_count(),
            pairing_edges = summary.pairing_edges,
            binding_edges = summary.binding_edges,
            chains_with_v_gene = summary.chains_with_v_gene,
            resolved_epitopes = summary.resolved_epitopes,
            dangling_edges = summary.dangling_edges,
            "Knowledge graph assembled"
        );
        for (node_type, count) in &summary.nodes_by_type {
            info!(node_type = %node_type, count, "Nodes by type");
        }
        for (edge_type, count) in &summary.edges_by_type {
            info!(edge_type = %edge_type, count, "Edges by type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(id: &str, node_type: &str, props: &[(&str, Option<&str>)]) -> Node {
        Node {
            id: id.into(),
            node_type: node_type.into(),
            properties: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }

    #[test]
    fn test_first_non_null_property_wins() {
        let mut graph = KnowledgeGraph::new();
        graph.add_nodes([node("epitope:iedb:1", "epitope", &[("antigen_name", None), ("publication", Some("123"))])]);
        let added = graph.add_nodes([node(
            "epitope:iedb:1",
            "epitope",
            &[("antigen_name", Some("pp65")), ("publication", Some("999"))],
        )]);
        assert_eq!(added, 0);
        let merged = graph.node("epitope:iedb:1").unwrap();
        assert_eq!(merged.property("antigen_name"), Some("pp65"));
        assert_eq!(merged.property("publication"), Some("123"));
    }

    #[test]
    fn test_summary_counts_and_dangling() {
        let mut graph = KnowledgeGraph::new();
        graph.add_nodes([
            node("tra:CAVF:TRAV1", "tra", &[("cdr3", Some("CAVF")), ("v_gene", Some("TRAV1"))]),
            node("trb:CASSF", "trb", &[("cdr3", Some("CASSF"))]),
            node("epitope:iedb:1", "epitope", &[("epitope_iedb_id", Some("iedb:1"))]),
            node("epitope:seq:AAA", "epitope", &[("epitope_iedb_id", Some("seq:AAA"))]),
        ]);
        graph.add_edges([
            Edge {
                id: "tra:CAVF:TRAV1-epitope:iedb:1".into(),
                source_id: "tra:CAVF:TRAV1".into(),
                target_id: "epitope:iedb:1".into(),
                edge_type: "tra_to_epitope".into(),
                properties: Properties::new(),
            },
            Edge {
                id: "tra:CAVF:TRAV1-trb:CASSY".into(),
                source_id: "tra:CAVF:TRAV1".into(),
                target_id: "trb:CASSY".into(),
                edge_type: "tra_to_trb".into(),
                properties: Properties::new(),
            },
        ]);
        let summary = graph.summary();
        assert_eq!(summary.node_count(), 4);
        assert_eq!(summary.edge_count(), 2);
        assert_eq!(summary.nodes_by_type.get("tra"), Some(&1));
        assert_eq!(summary.pairing_edges, 1);
        assert_eq!(summary.binding_edges, 1);
        assert_eq!(summary.chains_with_v_gene, 1);
        assert_eq!(summary.resolved_epitopes, 1);
        assert_eq!(summary.dangling_edges, 1);
        assert_eq!(graph.chains().count(), 2);
    }
}
