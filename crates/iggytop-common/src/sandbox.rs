use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;
use url::Url;
use crate::error::IggytopError;

const USER_AGENT: &str = concat!("iggytop/", env!("CARGO_PKG_VERSION"));

/// An HTTP client that only talks to the receptor/epitope data providers and
/// ontology services the pipeline depends on.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist and a 30 s timeout.
    pub fn new() -> Result<Self, IggytopError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, IggytopError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "query-api.iedb.org",        // IEDB query API (epitopes, references)
            "www.iedb.org",              // IEDB receptor export
            "ontology.iedb.org",         // IEDB ontology terms
            "cedar.iedb.org",            // CEDAR receptor export
            "www.ebi.ac.uk",             // OLS4, Zooma
            "api.github.com",            // VDJdb release metadata
            "github.com",                // VDJdb assets, NeoTCR
            "objects.githubusercontent.com",
            "raw.githubusercontent.com",
            "pgx.zju.edu.cn",            // TRAIT
            "tcr3d.ibbr.umd.edu",        // TCR3d
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IggytopError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn check(&self, url: &str) -> Result<(), IggytopError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            warn!(url, "Blocked request to non-allowlisted domain");
            Err(IggytopError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )))
        }
    }

    /// GET request builder for an allowlisted URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, IggytopError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }
}
