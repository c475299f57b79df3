//! Ontology label lookup (OLS4, IEDB ontology) and Zooma organism annotation.
//!
//! Endpoints used:
//!   OLS4:  https://www.ebi.ac.uk/ols4/api/ontologies/{ontology}/terms/{iri}
//!   IEDB:  {term IRI}.json
//!   Zooma: https://www.ebi.ac.uk/spot/zooma/v2/api/services/annotate
//!
//! Every call is best-effort: network errors, bad status codes and missing
//! fields all come back as `None`, never as an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use iggytop_common::sandbox::SandboxClient as Client;
use iggytop_common::Result;
use tracing::{debug, instrument, warn};

const OLS_TERMS_URL: &str = "https://www.ebi.ac.uk/ols4/api/ontologies";
const OBO_PURL: &str = "http://purl.obolibrary.org/obo/";
const IEDB_ONTOLOGY_MARKER: &str = "ontology.iedb.org/ontology/";
const ZOOMA_URL: &str = "https://www.ebi.ac.uk/spot/zooma/v2/api/services/annotate";

/// Label resolution used by the species resolver.
#[async_trait]
pub trait LabelLookup: Send + Sync {
    /// `(label, iri)` for an ontology term IRI, or `None` on any failure.
    async fn label_for_uri(&self, uri: &str) -> Option<(String, String)>;

    /// Label of the first high/good-confidence organism annotation for `term`.
    async fn annotate_organism(&self, term: &str) -> Option<String>;
}

/// Where an ontology IRI is dereferenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEndpoint {
    /// OBO library term, looked up through OLS4.
    Ols { url: String, iri: String },
    /// IEDB ontology term, served as JSON-LD.
    Iedb { url: String, iri: String },
}

/// Decide which provider serves `uri`. `None` for unsupported IRIs.
pub fn term_endpoint(uri: &str) -> Option<TermEndpoint> {
    if let Some((_, term)) = uri.rsplit_once("obo/") {
        let ontology = term.split('_').next().unwrap_or(term).to_lowercase();
        let iri = format!("{OBO_PURL}{term}");
        // OLS expects the IRI URL-encoded twice inside the path.
        let encoded = urlencoding::encode(&urlencoding::encode(&iri)).into_owned();
        return Some(TermEndpoint::Ols {
            url: format!("{OLS_TERMS_URL}/{ontology}/terms/{encoded}"),
            iri,
        });
    }
    if uri.contains(IEDB_ONTOLOGY_MARKER) {
        return Some(TermEndpoint::Iedb {
            url: format!("{uri}.json"),
            iri: uri.to_string(),
        });
    }
    None
}

pub struct OntologyClient {
    client: Client,
}

impl OntologyClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::with_timeout(timeout)?,
        })
    }

    async fn get_json(&self, url: &str) -> anyhow::Result<serde_json::Value> {
        let json = self
            .client
            .get(url)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(json)
    }

    #[instrument(skip(self))]
    async fn zooma_annotations(&self, term: &str) -> anyhow::Result<serde_json::Value> {
        let params = [
            ("propertyValue", term),
            ("propertyType", "organism"),
            ("ontologies", "[ncbitaxon]"),
            ("filter", "required:[uniprot],ontologies:[ncbitaxon]"),
        ];
        let json = self
            .client
            .get(ZOOMA_URL)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(json)
    }
}

#[async_trait]
impl LabelLookup for OntologyClient {
    #[instrument(skip(self))]
    async fn label_for_uri(&self, uri: &str) -> Option<(String, String)> {
        let (url, iri, field) = match term_endpoint(uri)? {
            TermEndpoint::Ols { url, iri } => (url, iri, "label"),
            TermEndpoint::Iedb { url, iri } => (url, iri, "rdfs:label"),
        };
        match self.get_json(&url).await {
            Ok(json) => {
                let label = json[field].as_str().map(String::from);
                debug!(?label, "Ontology label lookup");
                label.map(|l| (l, iri))
            }
            Err(e) => {
                warn!(error = %e, "Ontology label lookup failed");
                None
            }
        }
    }

    async fn annotate_organism(&self, term: &str) -> Option<String> {
        let annotations = match self.zooma_annotations(term).await {
            Ok(json) => json,
            Err(e) => {
                warn!(term, error = %e, "Zooma annotation failed");
                return None;
            }
        };

        let confident = annotations.as_array()?.iter().find(|a| {
            let confidence = a["confidence"].as_str().unwrap_or("").to_uppercase();
            confidence == "HIGH" || confidence == "GOOD"
        })?;
        let tag = confident["semanticTags"].get(0)?.as_str()?;
        self.label_for_uri(tag).await.map(|(label, _)| label)
    }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// Canned labels keyed by IRI and by annotated term.
#[derive(Debug, Default)]
pub struct MockLabelLookup {
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
}

impl MockLabelLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, uri: &str, label: &str) -> Self {
        self.labels.insert(uri.to_string(), label.to_string());
        self
    }

    pub fn with_annotation(mut self, term: &str, label: &str) -> Self {
        self.annotations.insert(term.to_string(), label.to_string());
        self
    }
}

#[async_trait]
impl LabelLookup for MockLabelLookup {
    async fn label_for_uri(&self, uri: &str) -> Option<(String, String)> {
        self.labels.get(uri).map(|l| (l.clone(), uri.to_string()))
    }

    async fn annotate_organism(&self, term: &str) -> Option<String> {
        self.annotations.get(term).cloned()
    }
}
