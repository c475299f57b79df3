//! IEDB query API client and batched reference resolution.
//!
//! Endpoints used:
//!   epitope_search:   https://query-api.iedb.org/epitope_search
//!   reference_export: https://query-api.iedb.org/reference_export
//!
//! Epitope sequences are resolved in two passes. Only clean amino-acid
//! strings are sent; anything else keeps its `seq:` sentinel. The exact pass asks for
//! records whose linear sequence is one of the chunk's sequences; whatever is
//! still unmatched goes through a substring pass with half the chunk size,
//! where the shortest containing record wins. Every request is cached under a
//! key derived from its sorted batch. A failed request only leaves its chunk
//! unresolved.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use iggytop_common::{IggytopError, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{request_key, ResponseCache};
use crate::normalise::is_valid_epitope;

const EPITOPE_SEARCH_URL: &str = "https://query-api.iedb.org/epitope_search";
const REFERENCE_EXPORT_URL: &str = "https://query-api.iedb.org/reference_export";
const EPITOPE_SELECT: &str =
    "select=structure_id,structure_descriptions,linear_sequence,curated_source_antigens&order=structure_id";

pub const DEFAULT_CHUNK_SIZE: usize = 150;
pub const NO_PMID_PREFIX: &str = "no_pmid_";

// ── API records ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Substring,
}

impl MatchMode {
    fn cache_prefix(&self) -> &'static str {
        match self {
            MatchMode::Exact => "iedb_exact_matches",
            MatchMode::Substring => "iedb_substring_matches",
        }
    }
}

/// One `epitope_search` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpitopeMatch {
    pub structure_id: i64,
    pub structure_descriptions: Vec<String>,
    pub linear_sequence: Option<String>,
    /// First curated source antigen: name and source organism.
    pub antigen: Option<String>,
    pub organism: Option<String>,
}

impl EpitopeMatch {
    /// The sequence this record answers for in an exact query.
    fn matched_sequence(&self) -> Option<&str> {
        self.structure_descriptions
            .first()
            .map(String::as_str)
            .or(self.linear_sequence.as_deref())
    }
}

/// One `reference_export` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePmid {
    pub reference_id: String,
    pub pmid: Option<String>,
}

/// Access to the IEDB query API.
#[async_trait]
pub trait IedbApi: Send + Sync {
    async fn search_epitopes(&self, epitopes: &[String], mode: MatchMode) -> Result<Vec<EpitopeMatch>>;

    async fn reference_pmids(&self, reference_ids: &[String]) -> Result<Vec<ReferencePmid>>;
}

fn json_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an `epitope_search` response body.
pub fn parse_epitope_matches(json: &serde_json::Value) -> Result<Vec<EpitopeMatch>> {
    let records = json.as_array().ok_or_else(|| {
        IggytopError::Other(anyhow::anyhow!("epitope_search response is not an array"))
    })?;

    let matches = records
        .iter()
        .filter_map(|r| {
            let structure_id = r["structure_id"].as_i64()?;
            let structure_descriptions = r["structure_descriptions"]
                .as_array()
                .map(|a| a.iter().filter_map(|d| d.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let first_antigen = r["curated_source_antigens"].get(0);
            let antigen_field = |field: &str| {
                first_antigen
                    .and_then(|a| a[field].as_str())
                    .map(String::from)
            };
            Some(EpitopeMatch {
                structure_id,
                structure_descriptions,
                linear_sequence: r["linear_sequence"].as_str().map(String::from),
                antigen: antigen_field("name"),
                organism: antigen_field("source_organism_name"),
            })
        })
        .collect();
    Ok(matches)
}

/// Parse a `reference_export` response body.
pub fn parse_reference_pmids(json: &serde_json::Value) -> Result<Vec<ReferencePmid>> {
    let records = json.as_array().ok_or_else(|| {
        IggytopError::Other(anyhow::anyhow!("reference_export response is not an array"))
    })?;
    Ok(records
        .iter()
        .filter_map(|r| {
            Some(ReferencePmid {
                reference_id: json_to_string(&r["reference_id"])?,
                pmid: json_to_string(&r["reference__pmid"]),
            })
        })
        .collect())
}

/// Live client; responses go through the on-disk cache.
pub struct IedbClient {
    cache: ResponseCache,
}

impl IedbClient {
    pub fn new(cache: ResponseCache) -> Self {
        Self { cache }
    }

    fn epitope_search_url(epitopes: &[String], mode: MatchMode) -> String {
        match mode {
            MatchMode::Exact => format!(
                "{EPITOPE_SEARCH_URL}?linear_sequence=in.({})&{EPITOPE_SELECT}",
                epitopes.join(",")
            ),
            MatchMode::Substring => {
                let conditions: Vec<String> = epitopes
                    .iter()
                    .map(|e| format!("linear_sequence.ilike.*{e}*"))
                    .collect();
                format!("{EPITOPE_SEARCH_URL}?or=({})&{EPITOPE_SELECT}", conditions.join(","))
            }
        }
    }
}

#[async_trait]
impl IedbApi for IedbClient {
    #[instrument(skip(self, epitopes), fields(n = epitopes.len()))]
    async fn search_epitopes(&self, epitopes: &[String], mode: MatchMode) -> Result<Vec<EpitopeMatch>> {
        let url = Self::epitope_search_url(epitopes, mode);
        let key = request_key(mode.cache_prefix(), epitopes);
        debug!(url = %truncate(&url, 100), "IEDB epitope request");
        let body = self.cache.cached_json(&key, &url).await?;
        parse_epitope_matches(&body)
    }

    #[instrument(skip(self, reference_ids), fields(n = reference_ids.len()))]
    async fn reference_pmids(&self, reference_ids: &[String]) -> Result<Vec<ReferencePmid>> {
        let url = format!(
            "{REFERENCE_EXPORT_URL}?reference_id=in.({})&select=reference_id,reference__pmid",
            reference_ids.join(",")
        );
        let key = request_key("iedb_reference_pmids", reference_ids);
        debug!(url = %truncate(&url, 100), "IEDB reference request");
        let body = self.cache.cached_json(&key, &url).await?;
        parse_reference_pmids(&body)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// How many of the requested items were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub matched: usize,
    pub total: usize,
}

impl MatchStats {
    /// Matched fraction in `[0, 1]`.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} matched ({:.1}%)", self.matched, self.total, self.rate() * 100.0)
    }
}

/// Reference data adopted for one epitope sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpitopeReference {
    /// `iedb:<structure id>`, or `seq:<sequence>` when unresolved.
    pub reference_id: String,
    pub antigen: Option<String>,
    pub organism: Option<String>,
}

impl EpitopeReference {
    pub fn unresolved(epitope: &str) -> Self {
        Self {
            reference_id: format!("seq:{epitope}"),
            antigen: None,
            organism: None,
        }
    }

    fn from_match(m: &EpitopeMatch) -> Self {
        Self {
            reference_id: format!("iedb:{}", m.structure_id),
            antigen: m.antigen.clone(),
            organism: m.organism.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.reference_id.starts_with("iedb:")
    }
}

#[derive(Debug, Clone, Default)]
pub struct EpitopeResolution {
    /// One entry per distinct input; blank inputs map to `None`.
    pub references: HashMap<String, Option<EpitopeReference>>,
    pub stats: MatchStats,
}

impl EpitopeResolution {
    pub fn reference(&self, epitope: &str) -> Option<&EpitopeReference> {
        self.references.get(epitope).and_then(Option::as_ref)
    }
}

fn dedup_preserving_order<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| seen.insert(*s))
        .map(String::from)
        .collect()
}

async fn search_or_empty(api: &dyn IedbApi, chunk: &[String], mode: MatchMode) -> Vec<EpitopeMatch> {
    match api.search_epitopes(chunk, mode).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(?mode, n = chunk.len(), error = %e, "IEDB epitope request failed");
            Vec::new()
        }
    }
}

/// Resolve epitope sequences to IEDB structure ids, antigens and organisms.
///
/// The result has an entry for every distinct input sequence. Blank inputs
/// map to `None`; unresolved sequences carry the `seq:<sequence>` sentinel.
pub async fn resolve_epitopes<S: AsRef<str>>(
    api: &dyn IedbApi,
    epitopes: &[S],
    chunk_size: usize,
) -> EpitopeResolution {
    let epitopes = dedup_preserving_order(epitopes);
    let chunk_size = chunk_size.max(1);
    let mut references: HashMap<String, Option<EpitopeReference>> = epitopes
        .iter()
        .map(|e| (e.clone(), (!e.trim().is_empty()).then(|| EpitopeReference::unresolved(e))))
        .collect();
    let queryable: Vec<String> = epitopes.iter().filter(|e| is_valid_epitope(e)).cloned().collect();

    info!(
        n = queryable.len(),
        skipped = epitopes.len() - queryable.len(),
        "Mapping epitope sequences to IEDB ids: exact matches"
    );
    for chunk in queryable.chunks(chunk_size) {
        for m in search_or_empty(api, chunk, MatchMode::Exact).await {
            let Some(sequence) = m.matched_sequence() else {
                continue;
            };
            // Records come ordered by structure id; the last one wins.
            if let Some(Some(entry)) = references.get_mut(sequence) {
                *entry = EpitopeReference::from_match(&m);
            }
        }
    }

    let is_resolved = |references: &HashMap<String, Option<EpitopeReference>>, e: &str| {
        references.get(e).and_then(Option::as_ref).is_some_and(EpitopeReference::is_resolved)
    };
    let unmatched: Vec<String> = queryable
        .iter()
        .filter(|e| !is_resolved(&references, e.as_str()))
        .cloned()
        .collect();

    if !unmatched.is_empty() {
        let fallback_chunk = (chunk_size / 2).max(1);
        info!(
            exact = queryable.len() - unmatched.len(),
            remaining = unmatched.len(),
            "Trying substring matches for remaining epitopes"
        );
        for chunk in unmatched.chunks(fallback_chunk) {
            let candidates = search_or_empty(api, chunk, MatchMode::Substring).await;
            for epitope in chunk {
                let best = candidates
                    .iter()
                    .filter_map(|m| m.linear_sequence.as_deref().map(|seq| (m, seq)))
                    .filter(|(_, seq)| seq.contains(epitope.as_str()))
                    .fold(None::<(&EpitopeMatch, usize)>, |best, (m, seq)| match best {
                        Some((_, len)) if len <= seq.len() => best,
                        _ => Some((m, seq.len())),
                    });
                if let Some((m, _)) = best {
                    references.insert(epitope.clone(), Some(EpitopeReference::from_match(m)));
                }
            }
        }
    }

    let stats = MatchStats {
        matched: references.values().flatten().filter(|r| r.is_resolved()).count(),
        total: references.values().flatten().count(),
    };
    info!(
        matched = stats.matched,
        total = stats.total,
        "Epitope mapping results: {stats}"
    );
    EpitopeResolution { references, stats }
}

fn digit_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Trailing integer id of a reference IRI/URL
/// (`http://www.iedb.org/reference/1004539` → `1004539`).
pub fn reference_id(url: &str) -> Option<&str> {
    digit_run_regex().find_iter(url).last().map(|m| m.as_str())
}

#[derive(Debug, Clone, Default)]
pub struct PmidResolution {
    /// Reference URL → PubMed id, or `no_pmid_<id>`.
    pub pmids: HashMap<String, String>,
    pub stats: MatchStats,
}

/// Resolve IEDB reference URLs to PubMed ids. URLs without any digits are
/// left out of the result.
pub async fn resolve_pmids<S: AsRef<str>>(
    api: &dyn IedbApi,
    reference_urls: &[S],
    chunk_size: usize,
) -> PmidResolution {
    let urls = dedup_preserving_order(reference_urls);
    let url_ids: Vec<(String, String)> = urls
        .into_iter()
        .filter_map(|u| reference_id(&u).map(String::from).map(|id| (u, id)))
        .collect();
    let ids = dedup_preserving_order(&url_ids.iter().map(|(_, id)| id.as_str()).collect::<Vec<_>>());

    info!(n = ids.len(), "Mapping IEDB reference ids to PubMed ids");
    let mut id_to_pmid: HashMap<String, String> = ids
        .iter()
        .map(|id| (id.clone(), format!("{NO_PMID_PREFIX}{id}")))
        .collect();

    for chunk in ids.chunks(chunk_size.max(1)) {
        let records = match api.reference_pmids(chunk).await {
            Ok(records) => records,
            Err(e) => {
                warn!(n = chunk.len(), error = %e, "IEDB reference request failed");
                continue;
            }
        };
        for record in records {
            if let (Some(entry), Some(pmid)) = (id_to_pmid.get_mut(&record.reference_id), record.pmid) {
                *entry = pmid;
            }
        }
    }

    let stats = MatchStats {
        matched: id_to_pmid.values().filter(|p| !p.starts_with(NO_PMID_PREFIX)).count(),
        total: ids.len(),
    };
    info!(matched = stats.matched, total = stats.total, "PMID mapping results: {stats}");

    let pmids = url_ids
        .into_iter()
        .filter_map(|(url, id)| id_to_pmid.get(&id).map(|p| (url, p.clone())))
        .collect();
    PmidResolution { pmids, stats }
}

// ── Mock Implementation for Testing ────────────────────────────────────────

/// In-memory IEDB with the same exact/substring semantics as the live API.
#[derive(Debug, Default)]
pub struct MockIedbApi {
    records: Vec<EpitopeMatch>,
    pmids: HashMap<String, String>,
    fail: bool,
    calls: Mutex<Vec<(MatchMode, usize)>>,
}

impl MockIedbApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, structure_id: i64, sequence: &str, antigen: Option<&str>, organism: Option<&str>) -> Self {
        self.records.push(EpitopeMatch {
            structure_id,
            structure_descriptions: vec![sequence.to_string()],
            linear_sequence: Some(sequence.to_string()),
            antigen: antigen.map(String::from),
            organism: organism.map(String::from),
        });
        self.records.sort_by_key(|r| r.structure_id);
        self
    }

    pub fn with_pmid(mut self, reference_id: &str, pmid: &str) -> Self {
        self.pmids.insert(reference_id.to_string(), pmid.to_string());
        self
    }

    /// Every request fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(mode, chunk length)` of every epitope request so far.
    pub fn calls(&self) -> Vec<(MatchMode, usize)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl IedbApi for MockIedbApi {
    async fn search_epitopes(&self, epitopes: &[String], mode: MatchMode) -> Result<Vec<EpitopeMatch>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((mode, epitopes.len()));
        }
        if self.fail {
            return Err(IggytopError::Other(anyhow::anyhow!("IEDB unavailable")));
        }
        let hits = self
            .records
            .iter()
            .filter(|r| {
                let seq = r.linear_sequence.as_deref().unwrap_or_default();
                match mode {
                    MatchMode::Exact => epitopes.iter().any(|e| e == seq),
                    MatchMode::Substring => epitopes.iter().any(|e| seq.contains(e.as_str())),
                }
            })
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn reference_pmids(&self, reference_ids: &[String]) -> Result<Vec<ReferencePmid>> {
        if self.fail {
            return Err(IggytopError::Other(anyhow::anyhow!("IEDB unavailable")));
        }
        Ok(reference_ids
            .iter()
            .filter_map(|id| {
                self.pmids.get(id).map(|p| ReferencePmid {
                    reference_id: id.clone(),
                    pmid: Some(p.clone()),
                })
            })
            .collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
