//! Source asset fetching.
//!
//! Remote assets are downloaded into `<cache>/downloads/<name>/` next to a
//! `manifest.json` recording the origin URL, fetch time and the files that
//! came out of it. A download younger than the cache lifetime is reused.
//! Zip archives are detected by their magic bytes and extracted in place.

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use iggytop_common::sandbox::SandboxClient;
use iggytop_common::{IggytopError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const GITHUB_API: &str = "https://api.github.com/repos";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const MANIFEST: &str = "manifest.json";

/// Where a source's raw data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    /// A fixed download URL.
    Url { name: String, url: String },
    /// First asset of the latest release of a GitHub repository.
    GitHubLatestRelease { name: String, repo: String },
    /// A file already on disk.
    LocalFile { path: PathBuf },
}

impl Asset {
    pub fn url(name: &str, url: &str) -> Self {
        Self::Url {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    pub fn github_latest_release(name: &str, repo: &str) -> Self {
        Self::GitHubLatestRelease {
            name: name.to_string(),
            repo: repo.to_string(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalFile { path: path.into() }
    }

    pub fn name(&self) -> String {
        match self {
            Asset::Url { name, .. } | Asset::GitHubLatestRelease { name, .. } => name.clone(),
            Asset::LocalFile { path } => path.display().to_string(),
        }
    }
}

/// Turns an [`Asset`] into local file paths.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<PathBuf>>;
}

/// The file called `file_name` among `paths`.
pub fn find_file(paths: &[PathBuf], file_name: &str) -> Result<PathBuf> {
    paths
        .iter()
        .find(|p| p.file_name().is_some_and(|n| n == file_name))
        .cloned()
        .ok_or_else(|| IggytopError::MissingAsset(format!("{file_name} not found among downloaded files")))
}

/// A local file, or every file directly inside a local directory (sorted).
fn fetch_local(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else if path.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() {
                files.push(entry_path);
            }
        }
        files.sort();
        Ok(files)
    } else {
        Err(IggytopError::MissingAsset(format!(
            "{} does not exist",
            path.display()
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DownloadManifest {
    url: String,
    fetched_at: DateTime<Utc>,
    files: Vec<PathBuf>,
}

/// Fetches remote assets over HTTP and keeps them on disk.
pub struct HttpFetcher {
    client: SandboxClient,
    root: PathBuf,
    lifetime: Duration,
}

impl HttpFetcher {
    /// Fetcher storing downloads under `<cache_root>/downloads`.
    pub fn new(cache_root: &Path, lifetime_days: i64, client: SandboxClient) -> Self {
        Self {
            client,
            root: cache_root.join("downloads"),
            lifetime: Duration::days(lifetime_days),
        }
    }

    fn fresh_download(&self, dir: &Path) -> Option<Vec<PathBuf>> {
        let raw = std::fs::read_to_string(dir.join(MANIFEST)).ok()?;
        let manifest: DownloadManifest = serde_json::from_str(&raw).ok()?;
        if Utc::now() - manifest.fetched_at >= self.lifetime {
            debug!(url = %manifest.url, "Download expired");
            return None;
        }
        let files: Vec<PathBuf> = manifest.files.iter().map(|f| dir.join(f)).collect();
        files.iter().all(|f| f.is_file()).then_some(files)
    }

    #[instrument(skip(self))]
    async fn latest_release_url(&self, repo: &str) -> Result<String> {
        let json: serde_json::Value = self
            .client
            .get(&format!("{GITHUB_API}/{repo}/releases/latest"))?
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let url = json["assets"][0]["browser_download_url"]
            .as_str()
            .ok_or_else(|| IggytopError::MissingAsset(format!("latest release of {repo} has no assets")))?;
        debug!(url, "Resolved latest release asset");
        Ok(url.to_string())
    }

    #[instrument(skip(self))]
    async fn download(&self, name: &str, url: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(name);
        if let Some(files) = self.fresh_download(&dir) {
            debug!(n_files = files.len(), "Reusing cached download");
            return Ok(files);
        }

        info!("Downloading source asset");
        let bytes = self
            .client
            .get(url)?
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;

        let file_name = file_name_for(url);
        let archive = dir.join(&file_name);
        std::fs::write(&archive, &bytes)?;

        let files = if bytes.starts_with(ZIP_MAGIC) {
            let extracted = extract_zip(&archive, &dir)?;
            std::fs::remove_file(&archive)?;
            extracted
        } else {
            vec![archive]
        };

        let manifest = DownloadManifest {
            url: url.to_string(),
            fetched_at: Utc::now(),
            files: files
                .iter()
                .filter_map(|f| f.strip_prefix(&dir).ok().map(Path::to_path_buf))
                .collect(),
        };
        std::fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(&manifest)?)?;
        info!(n_files = files.len(), bytes = bytes.len(), "Download complete");
        Ok(files)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<PathBuf>> {
        let result = match asset {
            Asset::LocalFile { path } => return fetch_local(path),
            Asset::Url { name, url } => self.download(name, url).await,
            Asset::GitHubLatestRelease { name, repo } => match self.latest_release_url(repo).await {
                Ok(url) => self.download(name, &url).await,
                Err(e) => Err(e),
            },
        };
        result.map_err(|e| match e {
            IggytopError::MissingAsset(_) => e,
            other => {
                warn!(asset = %asset.name(), error = %other, "Asset fetch failed");
                IggytopError::MissingAsset(format!("{}: {other}", asset.name()))
            }
        })
    }
}

/// Only resolves [`Asset::LocalFile`]; used when no network is wanted.
#[derive(Debug, Default)]
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<PathBuf>> {
        match asset {
            Asset::LocalFile { path } => fetch_local(path),
            other => Err(IggytopError::MissingAsset(format!(
                "{} is remote and network fetching is disabled",
                other.name()
            ))),
        }
    }
}

/// File name a download is stored under. Download scripts that pass the
/// file as a `file_name` query parameter are named after that parameter.
fn file_name_for(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return "download".to_string();
    };
    let from_query = parsed
        .query_pairs()
        .find(|(k, _)| k == "file_name")
        .and_then(|(_, v)| v.rsplit('/').next().map(String::from));
    let from_path = parsed
        .path_segments()
        .and_then(|mut s| s.next_back().map(String::from))
        .map(|s| match urlencoding::decode(&s) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => s.clone(),
        });

    from_query
        .or(from_path)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// Extract every file of `archive` below `dir`. Entries with unsafe paths
/// are skipped.
pub fn extract_zip(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut files = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
            continue;
        };
        let target = dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        files.push(target);
    }
    debug!(archive = %archive.display(), n_files = files.len(), "Extracted archive");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_file_name_for() {
        assert_eq!(
            file_name_for("https://cedar.iedb.org/downloader.php?file_name=doc/receptor_full_v3.zip"),
            "receptor_full_v3.zip"
        );
        assert_eq!(
            file_name_for("https://github.com/lyotvincent/NeoTCR/raw/main/data/NeoTCR%20data-20221220.xlsx"),
            "NeoTCR data-20221220.xlsx"
        );
        assert_eq!(file_name_for("not a url"), "download");
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("tcr_full_v3.csv", "a,b\n"), ("nested/bcr_full_v3.csv", "c\n")]);
        let files = extract_zip(&archive, dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let nested = find_file(&files, "bcr_full_v3.csv").unwrap();
        assert_eq!(std::fs::read_to_string(nested).unwrap(), "c\n");
        assert!(find_file(&files, "vdjdb.txt").is_err());
    }

    #[tokio::test]
    async fn test_local_file_assets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcpas_full.csv");
        std::fs::write(&path, "x\n").unwrap();

        let fetched = LocalFetcher.fetch(&Asset::local(&path)).await.unwrap();
        assert_eq!(fetched, vec![path.clone()]);

        std::fs::write(dir.path().join("a.csv"), "y\n").unwrap();
        let listed = LocalFetcher.fetch(&Asset::local(dir.path())).await.unwrap();
        assert_eq!(listed, vec![dir.path().join("a.csv"), path]);

        let missing = LocalFetcher.fetch(&Asset::local(dir.path().join("nope.csv"))).await;
        assert!(matches!(missing, Err(IggytopError::MissingAsset(_))));

        let remote = LocalFetcher.fetch(&Asset::url("tcr3d_latest", "https://tcr3d.ibbr.umd.edu/x.tsv")).await;
        assert!(matches!(remote, Err(IggytopError::MissingAsset(_))));
    }

    #[tokio::test]
    async fn test_fresh_download_is_reused() {
        let cache = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(cache.path(), 30, SandboxClient::new().unwrap());
        let dir = cache.path().join("downloads/tcr3d_latest");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tcr_complexes_data.tsv"), "Epitope\n").unwrap();
        let manifest = DownloadManifest {
            url: "https://tcr3d.ibbr.umd.edu/static/download/tcr_complexes_data.tsv".into(),
            fetched_at: Utc::now(),
            files: vec![PathBuf::from("tcr_complexes_data.tsv")],
        };
        std::fs::write(dir.join(MANIFEST), serde_json::to_vec(&manifest).unwrap()).unwrap();

        let asset = Asset::url("tcr3d_latest", &manifest.url);
        let files = fetcher.fetch(&asset).await.unwrap();
        assert_eq!(files, vec![dir.join("tcr_complexes_data.tsv")]);
    }

    #[tokio::test]
    async fn test_disallowed_host_is_missing_asset() {
        let cache = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(cache.path(), 30, SandboxClient::new().unwrap());
        let err = fetcher
            .fetch(&Asset::url("evil", "https://evil.example.com/data.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, IggytopError::MissingAsset(_)));
    }
}
