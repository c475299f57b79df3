//! Receptor/epitope source databases.
//!
//! Every source is a declarative [`SourceDefinition`]: where its export lives,
//! how to read it, which raw columns map onto the canonical keys, and an
//! optional reshape step for layouts that are not one receptor per row. One
//! generic engine drives all of them:
//!
//!   fetch → read → sample (test mode) → reshape → rename/select →
//!   constants/copies → explode → source transform → PMIDs → harmonise →
//!   node/edge projection

pub mod cedar;
pub mod iedb;
pub mod mcpas;
pub mod neotcr;
pub mod tcr3d;
pub mod trait_db;
pub mod vdjdb;

use std::path::PathBuf;

use iggytop_common::keys::{CHAIN_1, CHAIN_2, PUBLICATION};
use iggytop_common::{IggytopError, Result, Table};
use iggytop_kg::{generate_edges, generate_nodes, Edge, EdgeSpec, EntitySpec, Node};
use serde::Serialize;
use tracing::{info, instrument};

use crate::download::{find_file, Asset, Fetcher};
use crate::harmonize::{harmonize_sequences, HarmonizeOptions, HarmonizeReport};
use crate::iedb::{resolve_pmids, IedbApi, MatchStats};
use crate::ontology::LabelLookup;
use crate::reader::{read_table, TableFormat};

/// Rewrites a raw table into a one-receptor-per-row layout.
pub type Reshape = fn(Table) -> Result<Table>;

/// Source-specific cleanup after renaming.
pub type Transform = fn(&mut Table);

/// One file of a source asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// File name inside the fetched asset; `None` takes the first file.
    pub name: Option<&'static str>,
    pub format: TableFormat,
    /// Columns set on every row of this file before files are stacked.
    pub constants: &'static [(&'static str, &'static str)],
}

impl SourceFile {
    pub fn first(format: TableFormat) -> Self {
        Self {
            name: None,
            format,
            constants: &[],
        }
    }

    pub fn named(name: &'static str, format: TableFormat) -> Self {
        Self {
            name: Some(name),
            format,
            constants: &[],
        }
    }

    pub fn with_constants(mut self, constants: &'static [(&'static str, &'static str)]) -> Self {
        self.constants = constants;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SourceDefinition {
    pub name: &'static str,
    pub asset: Asset,
    pub files: Vec<SourceFile>,
    /// Cell values read as missing (blank cells always are).
    pub null_tokens: &'static [&'static str],
    pub reshape: Option<Reshape>,
    /// Raw column → canonical key. Every target is kept; every source must exist.
    pub renames: &'static [(&'static str, &'static str)],
    pub constants: &'static [(&'static str, Option<&'static str>)],
    /// `(from, to)` column copies, e.g. one organism column for both chains.
    pub copies: &'static [(&'static str, &'static str)],
    /// Split a multi-valued column into one row per value.
    pub explode: Option<(&'static str, char)>,
    pub transform: Option<Transform>,
    /// The publication column holds IEDB reference IRIs to resolve to PMIDs.
    pub resolve_publications: bool,
}

impl SourceDefinition {
    pub fn new(name: &'static str, asset: Asset, files: Vec<SourceFile>) -> Self {
        Self {
            name,
            asset,
            files,
            null_tokens: &["nan"],
            reshape: None,
            renames: &[],
            constants: &[],
            copies: &[],
            explode: None,
            transform: None,
            resolve_publications: false,
        }
    }

    /// Read from a local file or directory instead of the default asset.
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.asset = Asset::local(path);
        self
    }

    /// Fetch the asset and read all of its files into one table.
    pub async fn load(&self, fetcher: &dyn Fetcher) -> Result<Table> {
        let paths = fetcher.fetch(&self.asset).await?;
        let mut tables = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = match file.name {
                Some(name) => find_file(&paths, name)?,
                None => paths.first().cloned().ok_or_else(|| {
                    IggytopError::MissingAsset(format!("{} fetched no files", self.name))
                })?,
            };
            let mut table = read_table(&path, file.format, self.null_tokens)?;
            for &(column, value) in file.constants {
                table.set_constant(column, Some(value));
            }
            tables.push(table);
        }
        Ok(Table::concat(tables))
    }

    /// Map a raw table onto the canonical schema. Missing raw columns are
    /// schema drift.
    pub fn prepare(&self, raw: Table) -> Result<Table> {
        let raw = match self.reshape {
            Some(reshape) => reshape(raw)?,
            None => raw,
        };

        let mut renamed = raw;
        renamed.rename(self.renames);
        let mut keep: Vec<&str> = self.renames.iter().map(|(_, to)| *to).collect();
        for file in &self.files {
            for &(column, _) in file.constants {
                if !keep.contains(&column) {
                    keep.push(column);
                }
            }
        }
        let mut table = renamed.select(self.name, &keep)?;

        for &(column, value) in self.constants {
            table.set_constant(column, value);
        }
        for &(from, to) in self.copies {
            table.copy_column(from, to);
        }
        if let Some((column, separator)) = self.explode {
            table.explode(column, separator);
        }
        if let Some(transform) = self.transform {
            transform(&mut table);
        }
        Ok(table)
    }

    /// Run the whole source: fetch, prepare, harmonise and project.
    #[instrument(skip_all, fields(source = self.name))]
    pub async fn run(&self, services: &Services<'_>, options: &RunOptions) -> Result<SourceOutput> {
        let raw = self.load(services.fetcher).await?;
        let raw = if options.test_mode {
            raw.sample(options.sample_fraction, options.seed)
        } else {
            raw
        };
        let raw_rows = raw.len();

        let mut table = self.prepare(raw)?;

        let pmid_stats = if self.resolve_publications && table.has_column(PUBLICATION) {
            let references = table.distinct(PUBLICATION);
            let resolution =
                resolve_pmids(services.iedb, &references, options.harmonize.chunk_size).await;
            table.map_column(PUBLICATION, |v| v.and_then(|url| resolution.pmids.get(url).cloned()));
            Some(resolution.stats)
        } else {
            None
        };

        let harmonize =
            harmonize_sequences(&mut table, services.iedb, services.lookup, &options.harmonize).await;
        let (nodes, edges) = project(self.name, &mut table)?;

        info!(
            raw_rows,
            rows = table.len(),
            nodes = nodes.len(),
            edges = edges.len(),
            "Source processed"
        );
        Ok(SourceOutput {
            source: self.name.to_string(),
            rows: table.len(),
            nodes,
            edges,
            harmonize,
            pmid_stats,
        })
    }
}

/// External collaborators of a source run.
pub struct Services<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub iedb: &'a dyn IedbApi,
    pub lookup: &'a dyn LabelLookup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub harmonize: HarmonizeOptions,
    /// Keep only a deterministic sample of each source.
    pub test_mode: bool,
    pub sample_fraction: f64,
    pub seed: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            harmonize: HarmonizeOptions::default(),
            test_mode: false,
            sample_fraction: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutput {
    pub source: String,
    /// Rows after reshaping and exploding.
    pub rows: usize,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub harmonize: HarmonizeReport,
    pub pmid_stats: Option<MatchStats>,
}

/// Standard projection shared by every source: both chains and the epitope
/// as nodes, chain pairing and chain-epitope binding as edges. Canonical
/// columns a source does not provide are added as nulls.
pub fn project(source: &str, table: &mut Table) -> Result<(Vec<Node>, Vec<Edge>)> {
    let chain_1 = EntitySpec::chain(&CHAIN_1);
    let chain_2 = EntitySpec::chain(&CHAIN_2);
    let epitope = EntitySpec::epitope();
    for spec in [&chain_1, &chain_2, &epitope] {
        for column in &spec.columns {
            table.ensure_column(column);
        }
    }

    let mut nodes = generate_nodes(source, table, &chain_1)?;
    nodes.extend(generate_nodes(source, table, &chain_2)?);
    nodes.extend(generate_nodes(source, table, &epitope)?);

    let edge = |from: &EntitySpec, to: &EntitySpec| EdgeSpec {
        source: from.clone(),
        target: to.clone(),
        properties: Vec::new(),
    };
    let mut edges = generate_edges(source, table, &edge(&chain_1, &chain_2))?;
    edges.extend(generate_edges(source, table, &edge(&chain_1, &epitope))?);
    edges.extend(generate_edges(source, table, &edge(&chain_2, &epitope))?);
    Ok((nodes, edges))
}

/// Every known source, in default run order.
pub fn all_sources() -> Vec<SourceDefinition> {
    vec![
        vdjdb::definition(),
        mcpas::definition(),
        iedb::definition(),
        cedar::definition(),
        trait_db::definition(),
        tcr3d::definition(),
        neotcr::definition(),
    ]
}

pub fn source_by_name(name: &str) -> Option<SourceDefinition> {
    all_sources().into_iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// Strip a `PMID:` prefix from publication ids.
pub(crate) fn strip_pmid_prefix(table: &mut Table) {
    table.map_column(PUBLICATION, |v| {
        let id = v?.replace("PMID:", "");
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    });
}
