//! Content-addressed on-disk cache for JSON API responses.
//!
//! Each response is stored as `<dir>/<key>.json` inside an envelope recording
//! the request URL and fetch time. Keys are derived from the sorted request
//! batch, so the same batch in any order hits the same entry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use iggytop_common::sandbox::SandboxClient;
use iggytop_common::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    key: String,
    url: String,
    fetched_at: DateTime<Utc>,
    body: serde_json::Value,
}

/// `<prefix>_<sha256 of the sorted, "_"-joined batch>`.
pub fn request_key<S: AsRef<str>>(prefix: &str, batch: &[S]) -> String {
    let mut items: Vec<&str> = batch.iter().map(AsRef::as_ref).collect();
    items.sort_unstable();
    let digest = Sha256::digest(items.join("_").as_bytes());
    format!("{prefix}_{}", hex::encode(digest))
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    lifetime: Duration,
    client: SandboxClient,
}

impl ResponseCache {
    /// Cache rooted at `<cache_root>/requests`.
    pub fn new(cache_root: &Path, lifetime_days: i64, client: SandboxClient) -> Result<Self> {
        let dir = cache_root.join("requests");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lifetime: Duration::days(lifetime_days),
            client,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached body for `key`, if present and younger than the lifetime.
    pub fn load(&self, key: &str) -> Option<serde_json::Value> {
        let raw = std::fs::read_to_string(self.path_for(key)).ok()?;
        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                return None;
            }
        };
        if Utc::now() - envelope.fetched_at >= self.lifetime {
            debug!(key, fetched_at = %envelope.fetched_at, "Cache entry expired");
            return None;
        }
        Some(envelope.body)
    }

    /// Write `body` under `key` through a temp file and rename.
    pub fn store(&self, key: &str, url: &str, body: &serde_json::Value) -> Result<()> {
        let envelope = CacheEnvelope {
            key: key.to_string(),
            url: url.to_string(),
            fetched_at: Utc::now(),
            body: body.clone(),
        };
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Cached body for `key`, or GET `url`, store the JSON body and return it.
    #[instrument(skip(self, url))]
    pub async fn cached_json(&self, key: &str, url: &str) -> Result<serde_json::Value> {
        if let Some(body) = self.load(key) {
            debug!("Cache hit");
            return Ok(body);
        }

        let body: serde_json::Value = self
            .client
            .get(url)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.store(key, url, &body)?;
        debug!("Cache miss, response stored");
        Ok(body)
    }
}
