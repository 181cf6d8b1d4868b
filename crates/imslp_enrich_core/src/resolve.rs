use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::EnrichError;
use crate::http::{Fetcher, RetryPolicy};
use crate::site::{WikiSite, decode_component, title_from_slug};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageReference {
    Permalink { slug: String },
    NumericId(String),
    RawSlug(String),
}

impl PageReference {
    pub fn parse(raw: &str, site: &WikiSite) -> Self {
        if let Some(slug) = site.permalink_slug(raw) {
            return Self::Permalink {
                slug: slug.to_string(),
            };
        }
        if !raw.is_empty() && raw.bytes().all(|byte| byte.is_ascii_digit()) {
            return Self::NumericId(raw.to_string());
        }
        Self::RawSlug(raw.to_string())
    }
}

/// Turns a CLI target into a canonical title. Strategies run in a fixed order and
/// resolution never fails: the decoded raw input is the last resort.
pub struct TargetResolver<'a> {
    fetcher: Fetcher<'a>,
    site: &'a WikiSite,
    lookup_policy: RetryPolicy,
    scrape_policy: RetryPolicy,
}

impl<'a> TargetResolver<'a> {
    pub fn new(
        fetcher: Fetcher<'a>,
        site: &'a WikiSite,
        lookup_policy: RetryPolicy,
        scrape_policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            site,
            lookup_policy,
            scrape_policy,
        }
    }

    pub fn resolve(&self, raw: &str) -> String {
        match PageReference::parse(raw, self.site) {
            PageReference::Permalink { slug } => {
                let title = title_from_slug(&slug);
                debug!(%title, "resolved permalink locally");
                title
            }
            PageReference::NumericId(page_id) => self
                .resolve_page_id(&page_id)
                .unwrap_or_else(|| decode_component(raw)),
            PageReference::RawSlug(slug) => decode_component(&slug),
        }
    }

    fn resolve_page_id(&self, page_id: &str) -> Option<String> {
        match self.title_from_api(page_id) {
            Ok(title) => {
                debug!(page_id, %title, "resolved page id via api");
                return Some(title);
            }
            Err(error) => debug!(page_id, %error, "page id api lookup failed"),
        }
        match self.title_from_canonical_link(page_id) {
            Ok(title) => {
                debug!(page_id, %title, "resolved page id via canonical link");
                Some(title)
            }
            Err(error) => {
                debug!(page_id, %error, "canonical link fallback failed");
                None
            }
        }
    }

    fn title_from_api(&self, page_id: &str) -> Result<String, EnrichError> {
        let url = self.site.api_url.as_str();
        let response = self.fetcher.fetch(
            url,
            &[
                ("action", "query".to_string()),
                ("format", "json".to_string()),
                ("prop", "info".to_string()),
                ("pageids", page_id.to_string()),
                ("inprop", "url".to_string()),
            ],
            &self.lookup_policy,
        )?;
        if !response.is_ok() {
            return Err(EnrichError::malformed(
                url,
                format!("unexpected HTTP {}", response.status),
            ));
        }
        let payload = response.json(url)?;
        single_page_title(url, page_id, &payload)
    }

    /// Scrapes `<link rel="canonical">` from `index.php?curid=<id>`. Depends on the
    /// wiki's HTML template; there is no further fallback if that markup changes.
    fn title_from_canonical_link(&self, page_id: &str) -> Result<String, EnrichError> {
        let url = self.site.index_url.as_str();
        let response = self.fetcher.fetch(
            url,
            &[("curid", page_id.to_string())],
            &self.scrape_policy,
        )?;
        if !response.is_ok() {
            return Err(EnrichError::ResourceMissing(format!(
                "curid {page_id} returned HTTP {}",
                response.status
            )));
        }
        let pattern = Regex::new(&self.site.canonical_link_pattern())
            .map_err(|error| EnrichError::malformed(url, error.to_string()))?;
        let slug = pattern
            .captures(&response.body)
            .and_then(|captures| captures.get(1))
            .map(|slug| slug.as_str())
            .ok_or_else(|| EnrichError::malformed(url, "canonical link not found"))?;
        Ok(title_from_slug(slug))
    }
}

fn single_page_title(url: &str, page_id: &str, payload: &Value) -> Result<String, EnrichError> {
    let pages = payload
        .get("query")
        .and_then(|query| query.get("pages"))
        .and_then(Value::as_object)
        .ok_or_else(|| EnrichError::malformed(url, "missing query.pages"))?;
    if pages.len() != 1 {
        return Err(EnrichError::malformed(
            url,
            format!("expected one page entry, got {}", pages.len()),
        ));
    }
    let page = pages
        .values()
        .next()
        .ok_or_else(|| EnrichError::malformed(url, "empty query.pages"))?;
    if page.get("missing").is_some() {
        return Err(EnrichError::ResourceMissing(format!("page id {page_id}")));
    }
    page.get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .map(decode_component)
        .ok_or_else(|| EnrichError::malformed(url, "page entry has no title"))
}
