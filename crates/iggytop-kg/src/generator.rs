//! Generic table-to-graph projection.
//!
//! A harmonised table is projected into nodes and edges according to an
//! [`EntitySpec`]: which columns describe the entity, which of them form its
//! identity, and which become properties. The entity type is read from the
//! chain-type column when the entity spec covers a chain slot, otherwise it is
//! `epitope`.
//!
//! Node ids are `<type>:<unique values...>`; chain nodes additionally carry
//! their V gene (`trb:CASSLGTDTQYF:TRBV7-2`) so identical CDR3s with different
//! V-gene usage stay distinct. Edges reuse the same id construction for both
//! endpoints, so every edge endpoint matches a generated node id.

use std::collections::HashSet;

use iggytop_common::keys::{
    ChainColumns, ANTIGEN, ANTIGEN_ORGANISM, CHAIN_1, CHAIN_2, CHAIN_PREFIXES, EPITOPE,
    EPITOPE_IEDB_ID, EPITOPE_TYPE, MHC_CLASS, MHC_GENE_1, MHC_GENE_2, PUBLICATION,
};
use iggytop_common::table::Row;
use iggytop_common::{Result, Table};
use tracing::debug;

use crate::entities::{Edge, Node, Properties};

/// Which columns make up one entity and how it is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    /// Columns describing the entity. All must exist in the table.
    pub columns: Vec<&'static str>,
    /// Identity columns; rows with a null in any of them are skipped.
    pub unique: Vec<&'static str>,
    /// Property columns. `None` means `columns` minus `unique`.
    pub properties: Option<Vec<&'static str>>,
    /// Append the slot's V gene to chain node ids when present.
    pub with_v_gene: bool,
}

/// A pairing or binding edge between two entity specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    pub source: EntitySpec,
    pub target: EntitySpec,
    pub properties: Vec<&'static str>,
}

impl EntitySpec {
    pub fn new(columns: Vec<&'static str>, unique: Vec<&'static str>) -> Self {
        Self {
            columns,
            unique,
            properties: None,
            with_v_gene: false,
        }
    }

    pub fn with_properties(mut self, properties: Vec<&'static str>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_v_gene(mut self) -> Self {
        self.with_v_gene = true;
        self
    }

    /// Standard chain projection: identity is the CDR3 (plus V gene), every
    /// chain column is a property.
    pub fn chain(slot: &ChainColumns) -> Self {
        let columns = vec![
            slot.chain_type,
            slot.cdr3,
            slot.v_gene,
            slot.d_gene,
            slot.j_gene,
            slot.organism,
        ];
        Self::new(columns.clone(), vec![slot.cdr3])
            .with_properties(columns)
            .with_v_gene()
    }

    /// Standard epitope projection keyed by the resolved reference id.
    pub fn epitope() -> Self {
        let columns = vec![
            EPITOPE,
            EPITOPE_IEDB_ID,
            ANTIGEN,
            ANTIGEN_ORGANISM,
            MHC_CLASS,
            MHC_GENE_1,
            MHC_GENE_2,
            PUBLICATION,
        ];
        Self::new(columns.clone(), vec![EPITOPE_IEDB_ID]).with_properties(columns)
    }

    /// The chain slot this entity spec describes, if any.
    fn slot(&self) -> Option<&'static ChainColumns> {
        if self.columns.contains(&CHAIN_1.chain_type) {
            Some(&CHAIN_1)
        } else if self.columns.contains(&CHAIN_2.chain_type) {
            Some(&CHAIN_2)
        } else {
            None
        }
    }

    fn property_columns(&self) -> Vec<&'static str> {
        match &self.properties {
            Some(p) => p.clone(),
            None => self
                .columns
                .iter()
                .filter(|c| !self.unique.contains(*c))
                .copied()
                .collect(),
        }
    }

    /// Fail early if the table lacks any column the entity spec reads.
    fn check(&self, source: &str, table: &Table) -> Result<()> {
        for column in self.columns.iter().chain(&self.unique) {
            table.require(source, column)?;
        }
        if self.with_v_gene {
            if let Some(slot) = self.slot() {
                table.require(source, slot.v_gene)?;
            }
        }
        for column in self.property_columns() {
            table.require(source, column)?;
        }
        Ok(())
    }

    /// `(id, type)` of the entity described by `row`, or `None` when the row
    /// lacks a type or any identity value.
    fn identify(&self, row: Row<'_>) -> Option<(String, String)> {
        let slot = self.slot();
        let entity_type = match slot {
            Some(slot) => row.get(slot.chain_type)?.to_lowercase(),
            None => EPITOPE_TYPE.to_string(),
        };

        let mut parts = Vec::with_capacity(self.unique.len() + 2);
        parts.push(entity_type.clone());
        for column in &self.unique {
            parts.push(row.get(column)?.to_string());
        }
        if self.with_v_gene {
            if let Some(v_gene) = slot.and_then(|s| row.get(s.v_gene)) {
                parts.push(v_gene.to_string());
            }
        }
        Some((parts.join(":"), entity_type))
    }
}

/// Property key for a column: the chain prefix is dropped.
pub fn property_key(column: &str) -> &str {
    CHAIN_PREFIXES
        .iter()
        .find_map(|prefix| column.strip_prefix(prefix))
        .unwrap_or(column)
}

fn properties(row: Row<'_>, columns: &[&'static str]) -> Properties {
    columns
        .iter()
        .map(|c| (property_key(c).to_string(), row.get(c).map(str::to_string)))
        .collect()
}

/// Project `table` into deduplicated nodes.
pub fn generate_nodes(source: &str, table: &Table, spec: &EntitySpec) -> Result<Vec<Node>> {
    spec.check(source, table)?;
    let property_columns = spec.property_columns();

    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    for row in table.rows() {
        let Some((id, node_type)) = spec.identify(row) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        nodes.push(Node {
            id,
            node_type,
            properties: properties(row, &property_columns),
        });
    }

    debug!(source, n_rows = table.len(), n_nodes = nodes.len(), "Generated nodes");
    Ok(nodes)
}

/// Project `table` into deduplicated edges between two entity specs.
pub fn generate_edges(source: &str, table: &Table, spec: &EdgeSpec) -> Result<Vec<Edge>> {
    spec.source.check(source, table)?;
    spec.target.check(source, table)?;
    for column in &spec.properties {
        table.require(source, column)?;
    }

    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for row in table.rows() {
        let (Some((source_id, source_type)), Some((target_id, target_type))) =
            (spec.source.identify(row), spec.target.identify(row))
        else {
            continue;
        };
        let id = format!("{source_id}-{target_id}");
        if !seen.insert(id.clone()) {
            continue;
        }
        edges.push(Edge {
            id,
            source_id,
            target_id,
            edge_type: format!("{source_type}_to_{target_type}"),
            properties: properties(row, &spec.properties),
        });
    }

    debug!(source, n_rows = table.len(), n_edges = edges.len(), "Generated edges");
    Ok(edges)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
