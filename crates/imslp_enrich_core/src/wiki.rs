use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{Fetcher, RetryPolicy};
use crate::site::{WikiSite, strip_namespace};

/// Categories are fetched in one request; the API caps `max` at 500 for normal clients.
const CATEGORY_LIMIT: &str = "max";
const IMAGE_LISTING_IIPROP: &str = "url|size|sha1|mime|timestamp|user";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageObject {
    /// Full title including any namespace prefix.
    pub name: String,
    /// Title without the namespace prefix.
    pub page_title: String,
    pub page_id: Option<i64>,
    pub namespace: Option<i64>,
    pub last_revision: Option<i64>,
    pub exists: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageInfo {
    pub url: Option<String>,
    pub size: Option<u64>,
    pub sha1: Option<String>,
    pub mime: Option<String>,
    pub timestamp: Option<String>,
    pub user: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageEntry {
    /// Full title including the `File:` prefix, as for [`PageObject::name`].
    pub name: Option<String>,
    /// Key the imageinfo API answers to.
    pub title: Option<String>,
    pub imageinfo: Option<ImageInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RevisionRecord {
    pub revid: Option<i64>,
    pub user: Option<String>,
    pub timestamp: Option<String>,
    pub comment: Option<String>,
}

pub trait WikiClient {
    fn page(&self, title: &str) -> Result<PageObject>;
    fn categories(&self, title: &str) -> Result<Vec<String>>;
    fn images(&self, title: &str, limit: usize) -> Result<Vec<ImageEntry>>;
    /// Most recent first.
    fn revisions(&self, title: &str, limit: usize) -> Result<Vec<RevisionRecord>>;
}

pub struct MediaWikiClient<'a> {
    fetcher: Fetcher<'a>,
    api_url: String,
    policy: RetryPolicy,
}

impl<'a> MediaWikiClient<'a> {
    pub fn new(fetcher: Fetcher<'a>, site: &WikiSite, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            api_url: site.api_url.clone(),
            policy,
        }
    }

    fn query(&self, params: &[(&str, String)]) -> Result<Vec<PageQueryItem>> {
        let mut pairs = Vec::with_capacity(params.len() + 3);
        pairs.push(("action", "query".to_string()));
        pairs.push(("format", "json".to_string()));
        pairs.push(("formatversion", "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push((*key, value.clone()));
            }
        }

        let response = self
            .fetcher
            .fetch(&self.api_url, &pairs, &self.policy)
            .context("failed to call MediaWiki API")?;
        if !response.is_ok() {
            bail!("MediaWiki API request failed with HTTP {}", response.status);
        }
        let payload = response
            .json(&self.api_url)
            .context("failed to decode MediaWiki API JSON response")?;
        if let Some(error) = payload.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info");
            bail!("MediaWiki API error [{code}]: {info}");
        }
        let parsed: QueryResponse =
            serde_json::from_value(payload).context("unexpected MediaWiki query shape")?;
        Ok(parsed.query.pages)
    }

    fn first_page(&self, title: &str, params: &[(&str, String)]) -> Result<Option<PageQueryItem>> {
        let mut pairs = vec![("titles", title.to_string())];
        pairs.extend(params.iter().cloned());
        Ok(self.query(&pairs)?.into_iter().next())
    }
}

impl WikiClient for MediaWikiClient<'_> {
    fn page(&self, title: &str) -> Result<PageObject> {
        let page = self
            .first_page(title, &[("prop", "info".to_string())])?
            .ok_or_else(|| anyhow::anyhow!("no page entry returned for {title}"))?;
        Ok(PageObject {
            page_title: strip_namespace(&page.title, page.ns),
            name: page.title,
            page_id: page.pageid,
            namespace: page.ns,
            last_revision: page.lastrevid,
            exists: !page.missing && !page.invalid,
        })
    }

    fn categories(&self, title: &str) -> Result<Vec<String>> {
        let page = self.first_page(
            title,
            &[
                ("prop", "categories".to_string()),
                ("cllimit", CATEGORY_LIMIT.to_string()),
            ],
        )?;
        Ok(page
            .map(|page| page.categories.into_iter().map(|item| item.title).collect())
            .unwrap_or_default())
    }

    fn images(&self, title: &str, limit: usize) -> Result<Vec<ImageEntry>> {
        let pages = self.query(&[
            ("titles", title.to_string()),
            ("generator", "images".to_string()),
            ("gimlimit", limit.clamp(1, 500).to_string()),
            ("prop", "imageinfo".to_string()),
            ("iiprop", IMAGE_LISTING_IIPROP.to_string()),
        ])?;
        Ok(pages
            .into_iter()
            .take(limit)
            .map(|page| ImageEntry {
                name: Some(page.title.clone()),
                imageinfo: page.imageinfo.into_iter().next(),
                title: Some(page.title),
            })
            .collect())
    }

    fn revisions(&self, title: &str, limit: usize) -> Result<Vec<RevisionRecord>> {
        let page = self.first_page(
            title,
            &[
                ("prop", "revisions".to_string()),
                ("rvprop", "ids|user|timestamp|comment".to_string()),
                ("rvlimit", limit.max(1).to_string()),
            ],
        )?;
        Ok(page.map(|page| page.revisions).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    ns: Option<i64>,
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    lastrevid: Option<i64>,
    #[serde(default)]
    categories: Vec<TitleQueryItem>,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
    #[serde(default)]
    revisions: Vec<RevisionRecord>,
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
}
