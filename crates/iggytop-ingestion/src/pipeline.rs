//! Multi-source pipeline.
//!
//! Runs each enabled source one after another:
//!   1. Fetch and read the source export
//!   2. Reshape and rename onto the canonical schema
//!   3. Harmonise sequences, genes, species and antigens
//!   4. Project into nodes and edges
//!   5. Merge into the shared knowledge graph
//!
//! A failing source is recorded in its report and the run continues with the
//! next one. Progress events go out on an optional broadcast channel.

use std::time::Instant;

use iggytop_kg::KnowledgeGraph;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::sources::{RunOptions, Services, SourceDefinition};

// ── Progress events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Started,
    Finished,
    Failed,
}

/// Progress event emitted per source (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct SourceProgress {
    pub source: String,
    pub stage: Stage,
    pub message: String,
}

// ── Result summary ────────────────────────────────────────────────────────────

/// Outcome of one source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub source: String,
    pub rows: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Nodes/edges not already in the graph from an earlier source.
    pub new_nodes: usize,
    pub new_edges: usize,
    /// Fraction of distinct epitopes matched to IEDB, when resolution ran.
    pub epitope_match_rate: Option<f64>,
    pub pmid_match_rate: Option<f64>,
    pub cdr3_dropped: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct PipelineResult {
    pub graph: KnowledgeGraph,
    pub reports: Vec<RunReport>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.source.as_str())
            .collect()
    }
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

/// Run `sources` in order and merge their output into one graph.
#[instrument(skip_all, fields(n_sources = sources.len()))]
pub async fn run_pipeline(
    sources: &[SourceDefinition],
    services: &Services<'_>,
    options: &RunOptions,
    progress_tx: Option<broadcast::Sender<SourceProgress>>,
) -> PipelineResult {
    let t0 = Instant::now();
    let emit = |source: &str, stage: Stage, message: String| {
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(SourceProgress {
                source: source.to_string(),
                stage,
                message,
            });
        }
    };

    info!(test_mode = options.test_mode, "Starting pipeline");
    let mut result = PipelineResult::default();

    for source in sources {
        let started = Instant::now();
        emit(source.name, Stage::Started, format!("Processing {}", source.name));
        let mut report = RunReport {
            source: source.name.to_string(),
            ..RunReport::default()
        };

        match source.run(services, options).await {
            Ok(output) => {
                report.rows = output.rows;
                report.nodes = output.nodes.len();
                report.edges = output.edges.len();
                report.cdr3_dropped = output.harmonize.cdr3_dropped;
                report.epitope_match_rate = output.harmonize.epitope_stats.map(|s| s.rate());
                report.pmid_match_rate = output.pmid_stats.map(|s| s.rate());
                report.new_nodes = result.graph.add_nodes(output.nodes);
                report.new_edges = result.graph.add_edges(output.edges);
                emit(
                    source.name,
                    Stage::Finished,
                    format!("{} nodes, {} edges", report.nodes, report.edges),
                );
            }
            Err(e) => {
                error!(source = source.name, error = %e, "Source failed, continuing");
                emit(source.name, Stage::Failed, e.to_string());
                report.error = Some(e.to_string());
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        result.reports.push(report);
    }

    result.duration_ms = t0.elapsed().as_millis() as u64;
    info!(
        duration_ms = result.duration_ms,
        nodes = result.graph.nodes().len(),
        edges = result.graph.edges().len(),
        failed = result.failed_sources().len(),
        "Pipeline complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::LocalFetcher;
    use crate::iedb::MockIedbApi;
    use crate::ontology::MockLabelLookup;
    use crate::sources::{mcpas, tcr3d};

    #[tokio::test]
    async fn test_failed_source_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tcr_complexes_data.tsv");
        std::fs::write(
            &path,
            "CDR3_alpha\tTRAV_gene\tCDR3_beta\tTRBV_gene\tEpitope\tMHC_allele\tTCR_organism\tPubmed\n\
             CAVTTDSWGKLQF\tTRAV12-2\tCASRPGLAGGRPEQYF\tTRBV6-5\tLLFGYPVYV\tHLA-A*02:01\tHuman\t8906788\n",
        )
        .unwrap();

        let sources = vec![
            mcpas::definition().with_local_path(dir.path().join("missing.csv")),
            tcr3d::definition().with_local_path(&path),
        ];
        let iedb = MockIedbApi::new().with_record(1, "LLFGYPVYV", Some("Tax"), Some("HTLV-1"));
        let lookup = MockLabelLookup::new();
        let services = Services {
            fetcher: &LocalFetcher,
            iedb: &iedb,
            lookup: &lookup,
        };
        let (tx, mut rx) = broadcast::channel(16);

        let result = run_pipeline(&sources, &services, &RunOptions::default(), Some(tx)).await;

        assert_eq!(result.failed_sources(), ["mcpas"]);
        let tcr3d = &result.reports[1];
        assert!(tcr3d.succeeded());
        assert_eq!(tcr3d.rows, 1);
        assert_eq!(tcr3d.nodes, 3);
        assert_eq!(tcr3d.edges, 3);
        assert_eq!(tcr3d.epitope_match_rate, Some(1.0));
        assert!(result.graph.node("epitope:iedb:1").is_some());

        let stages: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).map(|p| p.stage).collect();
        assert_eq!(stages, [Stage::Started, Stage::Failed, Stage::Started, Stage::Finished]);
    }
}
