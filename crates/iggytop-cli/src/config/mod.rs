//! Configuration loading for iggytop.
//! Reads iggytop.toml from the current directory or the path in the IGGYTOP_CONFIG env var.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use iggytop_ingestion::harmonize::HarmonizeOptions;
use iggytop_ingestion::sources::{self, mcpas, RunOptions, SourceDefinition};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub species: SpeciesConfig,
    #[serde(default)]
    pub run: RunConfig,
    /// Per-source overrides, keyed by source name.
    #[serde(default = "default_source_overrides")]
    pub sources: BTreeMap<String, SourceOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_lifetime_days")]
    pub lifetime_days: i64,
}

fn default_cache_dir()     -> PathBuf { PathBuf::from(".cache/iggytop") }
fn default_lifetime_days() -> i64     { 30 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            lifetime_days: default_lifetime_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ontology_timeout_secs")]
    pub ontology_timeout_secs: u64,
}

fn default_timeout_secs()          -> u64 { 30 }
fn default_ontology_timeout_secs() -> u64 { 10 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            ontology_timeout_secs: default_ontology_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ontology_timeout(&self) -> Duration {
        Duration::from_secs(self.ontology_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize { 150 }

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { chunk_size: default_chunk_size() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesConfig {
    /// Also ask Zooma for organism annotations.
    #[serde(default)]
    pub zooma: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
}

fn default_sample_fraction() -> f64 { 0.01 }
fn default_seed()            -> u64 { 42 }

fn default_sources() -> Vec<String> {
    sources::all_sources().iter().map(|s| s.name.to_string()).collect()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            sample_fraction: default_sample_fraction(),
            seed: default_seed(),
            sources: default_sources(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOverride {
    /// Read this local file (or directory) instead of downloading.
    pub path: Option<PathBuf>,
}

fn default_source_overrides() -> BTreeMap<String, SourceOverride> {
    BTreeMap::from([(
        mcpas::NAME.to_string(),
        SourceOverride {
            path: Some(PathBuf::from(mcpas::DEFAULT_PATH)),
        },
    )])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            resolver: ResolverConfig::default(),
            species: SpeciesConfig::default(),
            run: RunConfig::default(),
            sources: default_source_overrides(),
        }
    }
}


impl Config {
    /// Load configuration from iggytop.toml.
    /// Checks IGGYTOP_CONFIG env var first, then the current directory.
    /// A missing file falls back to the built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("IGGYTOP_CONFIG").unwrap_or_else(|_| "iggytop.toml".to_string());

        if !Path::new(&path).exists() {
            warn!(path = %path, "Config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        // McPAS-TCR has no download; keep its local default unless overridden.
        config
            .sources
            .entry(mcpas::NAME.to_string())
            .or_default()
            .path
            .get_or_insert_with(|| PathBuf::from(mcpas::DEFAULT_PATH));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resolver.chunk_size == 0 {
            anyhow::bail!("resolver.chunk_size must be positive");
        }
        if !(self.run.sample_fraction > 0.0 && self.run.sample_fraction <= 1.0) {
            anyhow::bail!(
                "run.sample_fraction must be in (0, 1], got {}",
                self.run.sample_fraction
            );
        }
        for name in self.run.sources.iter().chain(self.sources.keys()) {
            if sources::source_by_name(name).is_none() {
                anyhow::bail!("Unknown source '{name}'");
            }
        }
        Ok(())
    }

    /// The enabled sources, in configured order, with local path overrides applied.
    pub fn source_definitions(&self) -> anyhow::Result<Vec<SourceDefinition>> {
        self.run
            .sources
            .iter()
            .map(|name| {
                let definition = sources::source_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown source '{name}'"))?;
                let path = self
                    .sources
                    .get(definition.name)
                    .and_then(|o| o.path.clone());
                Ok(match path {
                    Some(path) => definition.with_local_path(path),
                    None => definition,
                })
            })
            .collect()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            harmonize: HarmonizeOptions {
                chunk_size: self.resolver.chunk_size,
                zooma: self.species.zooma,
            },
            test_mode: self.run.test_mode,
            sample_fraction: self.run.sample_fraction,
            seed: self.run.seed,
        }
    }
}
