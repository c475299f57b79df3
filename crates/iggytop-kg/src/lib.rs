//! iggytop-kg — Graph entities for receptor chains and epitopes.
//!
//! Harmonised source tables are projected into nodes and edges by the
//! generic [`generator`], then merged into a [`graph::KnowledgeGraph`].

pub mod entities;
pub mod generator;
pub mod graph;

pub use entities::{ChainRecord, Edge, EpitopeRecord, Node, Properties};
pub use generator::{generate_edges, generate_nodes, EdgeSpec, EntitySpec};
pub use graph::{GraphSummary, KnowledgeGraph};
