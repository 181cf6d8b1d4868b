use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EnrichError;
use crate::http::{Fetcher, RetryPolicy};
use crate::wiki::{ImageEntry, ImageInfo};

pub const MAX_FILES: usize = 100;
pub const IMAGEINFO_BATCH_SIZE: usize = 50;
const ENRICH_IIPROP: &str = "url|size|sha1|mime|timestamp|user|comment";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadUrls {
    pub original: Option<String>,
    pub https: Option<String>,
    pub direct: Option<String>,
}

impl DownloadUrls {
    /// Derived from a listing URL, which may be protocol-relative.
    pub fn from_listing_url(url: Option<&str>) -> Self {
        Self {
            original: url.map(str::to_string),
            https: url.map(secure_scheme),
            direct: url.map(|url| {
                if url.starts_with("//") {
                    format!("https:{url}")
                } else {
                    url.to_string()
                }
            }),
        }
    }

    /// Derived from an imageinfo URL, which is always absolute.
    pub fn from_resolved_url(url: Option<&str>) -> Self {
        Self {
            original: url.map(str::to_string),
            https: url.map(secure_scheme),
            direct: url.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub name: Option<String>,
    /// Merge key; never overwritten after seeding.
    pub title: Option<String>,
    pub url: Option<String>,
    pub size: Option<u64>,
    pub sha1: Option<String>,
    pub mime_type: Option<String>,
    pub timestamp: Option<String>,
    pub user: Option<String>,
    pub download_urls: DownloadUrls,
}

impl FileRecord {
    pub fn seed(entry: &ImageEntry) -> Self {
        let info = entry.imageinfo.clone().unwrap_or_default();
        let title = entry.title.clone().or_else(|| entry.name.clone());
        Self {
            name: entry.name.clone(),
            title,
            download_urls: DownloadUrls::from_listing_url(info.url.as_deref()),
            url: info.url,
            size: info.size,
            sha1: info.sha1,
            mime_type: info.mime,
            timestamp: info.timestamp,
            user: info.user,
        }
    }

    /// Apply an authoritative imageinfo record. Text fields take the remote value when
    /// it is non-empty; `size` takes it whenever it is non-null.
    pub fn apply(&mut self, info: &ImageInfo) {
        self.url = prefer_text(&info.url, self.url.take());
        self.mime_type = prefer_text(&info.mime, self.mime_type.take());
        self.timestamp = prefer_text(&info.timestamp, self.timestamp.take());
        self.user = prefer_text(&info.user, self.user.take());
        self.sha1 = prefer_text(&info.sha1, self.sha1.take());
        if info.size.is_some() {
            self.size = info.size;
        }
        self.download_urls = DownloadUrls::from_resolved_url(self.url.as_deref());
    }
}

fn prefer_text(remote: &Option<String>, seed: Option<String>) -> Option<String> {
    match remote {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => seed,
    }
}

fn secure_scheme(url: &str) -> String {
    match url.strip_prefix("http:") {
        Some(rest) => format!("https:{rest}"),
        None => url.to_string(),
    }
}

/// One record per listed image, capped at [`MAX_FILES`].
pub fn seed_records(images: &[ImageEntry]) -> Vec<FileRecord> {
    images.iter().take(MAX_FILES).map(FileRecord::seed).collect()
}

/// Distinct merge keys in first-seen order, capped at [`MAX_FILES`].
pub fn merge_keys(records: &[FileRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for title in records.iter().filter_map(|record| record.title.as_ref()) {
        if seen.insert(title.as_str()) {
            keys.push(title.clone());
        }
    }
    keys.truncate(MAX_FILES);
    keys
}

/// Batches of at most [`IMAGEINFO_BATCH_SIZE`] over the first [`MAX_FILES`] keys.
pub fn enrichment_batches(keys: &[String]) -> impl Iterator<Item = &[String]> {
    keys[..keys.len().min(MAX_FILES)].chunks(IMAGEINFO_BATCH_SIZE)
}

pub fn reconcile(records: &mut [FileRecord], by_title: &BTreeMap<String, ImageInfo>) {
    for record in records.iter_mut() {
        let Some(info) = record.title.as_ref().and_then(|title| by_title.get(title)) else {
            continue;
        };
        record.apply(info);
    }
}

/// Builds a page's file list from its image listing, enriched by batched
/// `prop=imageinfo` lookups.
pub struct FileMerger<'a> {
    fetcher: Fetcher<'a>,
    api_url: &'a str,
    policy: RetryPolicy,
}

impl<'a> FileMerger<'a> {
    pub fn new(fetcher: Fetcher<'a>, api_url: &'a str, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            api_url,
            policy,
        }
    }

    /// Seed, look up, reconcile. Failed batches are skipped; the seed data stays.
    pub fn merge(&self, images: &[ImageEntry]) -> Vec<FileRecord> {
        let mut records = seed_records(images);
        let keys = merge_keys(&records);
        if keys.is_empty() {
            return records;
        }
        let by_title = self.lookup_imageinfo(&keys);
        debug!(
            seeded = records.len(),
            enriched = by_title.len(),
            "reconciling file metadata"
        );
        reconcile(&mut records, &by_title);
        records
    }

    pub fn lookup_imageinfo(&self, keys: &[String]) -> BTreeMap<String, ImageInfo> {
        let mut by_title = BTreeMap::new();
        for (index, batch) in enrichment_batches(keys).enumerate() {
            match self.fetch_batch(batch) {
                Ok(entries) => by_title.extend(entries),
                Err(error) => warn!(batch = index, size = batch.len(), %error, "skipping imageinfo batch"),
            }
        }
        by_title
    }

    fn fetch_batch(&self, titles: &[String]) -> Result<Vec<(String, ImageInfo)>, EnrichError> {
        let response = self.fetcher.fetch(
            self.api_url,
            &[
                ("action", "query".to_string()),
                ("format", "json".to_string()),
                ("prop", "imageinfo".to_string()),
                ("iiprop", ENRICH_IIPROP.to_string()),
                ("titles", titles.join("|")),
            ],
            &self.policy,
        )?;
        if !response.is_ok() {
            return Err(EnrichError::malformed(
                self.api_url,
                format!("unexpected HTTP {}", response.status),
            ));
        }
        let payload = response.json(self.api_url)?;
        Ok(imageinfo_by_title(&payload))
    }
}

/// `title -> imageinfo[0]` for every page entry that has both.
fn imageinfo_by_title(payload: &Value) -> Vec<(String, ImageInfo)> {
    let Some(pages) = payload
        .get("query")
        .and_then(|query| query.get("pages"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };
    pages
        .values()
        .filter_map(|page| {
            let title = page.get("title").and_then(Value::as_str)?;
            if title.is_empty() {
                return None;
            }
            let first = page.get("imageinfo")?.as_array()?.first()?;
            let info = serde_json::from_value::<ImageInfo>(first.clone()).ok()?;
            Some((title.to_string(), info))
        })
        .collect()
}
