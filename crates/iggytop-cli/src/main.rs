//! iggytop — Immune receptor/epitope knowledge graph builder.
//! Entry point for the command-line binary.
//!
//! Usage: `iggytop [SOURCE ...]`. Without arguments the sources listed in
//! `[run] sources` of iggytop.toml are processed.

mod config;

use anyhow::Context;
use iggytop_common::sandbox::SandboxClient;
use iggytop_ingestion::cache::ResponseCache;
use iggytop_ingestion::download::HttpFetcher;
use iggytop_ingestion::iedb::IedbClient;
use iggytop_ingestion::ontology::OntologyClient;
use iggytop_ingestion::pipeline::run_pipeline;
use iggytop_ingestion::sources::Services;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("iggytop=debug,info")),
        )
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load()?;
    let requested: Vec<String> = std::env::args().skip(1).collect();
    if !requested.is_empty() {
        config.run.sources = requested;
        config.validate()?;
    }
    info!(
        sources = ?config.run.sources,
        test_mode = config.run.test_mode,
        cache = %config.cache.directory.display(),
        "Configuration loaded"
    );

    let sources = config.source_definitions()?;
    let options = config.run_options();

    std::fs::create_dir_all(&config.cache.directory).with_context(|| {
        format!("Cannot create cache directory {}", config.cache.directory.display())
    })?;
    let client = SandboxClient::with_timeout(config.http.timeout())?;
    let fetcher = HttpFetcher::new(&config.cache.directory, config.cache.lifetime_days, client.clone());
    let cache = ResponseCache::new(&config.cache.directory, config.cache.lifetime_days, client)?;
    let iedb = IedbClient::new(cache);
    let lookup = OntologyClient::new(config.http.ontology_timeout())?;
    let services = Services {
        fetcher: &fetcher,
        iedb: &iedb,
        lookup: &lookup,
    };

    let result = run_pipeline(&sources, &services, &options, None).await;

    for report in &result.reports {
        match &report.error {
            None => info!(
                source = %report.source,
                rows = report.rows,
                nodes = report.nodes,
                edges = report.edges,
                new_nodes = report.new_nodes,
                epitope_match_rate = ?report.epitope_match_rate,
                pmid_match_rate = ?report.pmid_match_rate,
                duration_ms = report.duration_ms,
                "Source report"
            ),
            Some(error) => warn!(source = %report.source, error = %error, "Source failed"),
        }
    }
    result.graph.log_summary();
    println!("{}", serde_json::to_string_pretty(&result.graph.summary())?);

    let failed = result.failed_sources();
    if !sources.is_empty() && failed.len() == sources.len() {
        anyhow::bail!("Every source failed: {}", failed.join(", "));
    }
    Ok(())
}
