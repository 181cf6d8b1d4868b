use reqwest::Url;

use crate::config::EnrichConfig;
use crate::error::EnrichError;

/// URL shapes of the target wiki, derived once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSite {
    pub base_url: String,
    /// `base_url` without its scheme, e.g. `imslp.org`.
    pub authority: String,
    /// Article path up to the `$1` placeholder, e.g. `/wiki/`.
    pub article_prefix: String,
    pub article_suffix: String,
    pub api_url: String,
    pub index_url: String,
}

impl WikiSite {
    pub fn from_config(config: &EnrichConfig) -> Result<Self, EnrichError> {
        let base_url = config.base_url();
        let parsed = Url::parse(&base_url)
            .map_err(|error| EnrichError::Construction(format!("invalid base_url {base_url}: {error}")))?;
        if parsed.host_str().is_none() {
            return Err(EnrichError::Construction(format!(
                "base_url has no host: {base_url}"
            )));
        }
        for (label, value) in [("api_url", config.api_url()), ("index_url", config.index_url())] {
            Url::parse(&value)
                .map_err(|error| EnrichError::Construction(format!("invalid {label} {value}: {error}")))?;
        }

        let authority = base_url
            .split_once("://")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| base_url.clone());
        let article_path = config.article_path();
        let (article_prefix, article_suffix) = article_path
            .split_once("$1")
            .map(|(prefix, suffix)| (prefix.to_string(), suffix.to_string()))
            .unwrap_or((article_path.clone(), String::new()));

        Ok(Self {
            base_url,
            authority,
            article_prefix,
            article_suffix,
            api_url: config.api_url(),
            index_url: config.index_url(),
        })
    }

    /// The raw slug after the article prefix, when `raw` is a permalink to this wiki.
    pub fn permalink_slug<'r>(&self, raw: &'r str) -> Option<&'r str> {
        ["http://", "https://"].iter().find_map(|scheme| {
            let rest = raw.strip_prefix(scheme)?;
            let rest = rest.strip_prefix(self.authority.as_str())?;
            let slug = rest.strip_prefix(self.article_prefix.as_str())?;
            Some(slug.strip_suffix(self.article_suffix.as_str()).unwrap_or(slug))
                .filter(|slug| !slug.is_empty())
        })
    }

    pub fn page_url(&self, title: &str) -> String {
        format!(
            "{}{}{}{}",
            self.base_url,
            self.article_prefix,
            encode_title(title),
            self.article_suffix
        )
    }

    /// Pattern for `<link rel="canonical" href="...">` pointing into this wiki's article path.
    /// Capture group 1 is the raw slug.
    pub fn canonical_link_pattern(&self) -> String {
        format!(
            r#"<link rel="canonical" href="https?://{}{}([^"]+)""#,
            regex::escape(&self.authority),
            regex::escape(&self.article_prefix)
        )
    }
}

/// Percent-decode, replacing invalid UTF-8 rather than failing.
pub fn decode_component(raw: &str) -> String {
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Decode a slug and turn its underscores into spaces.
pub fn title_from_slug(slug: &str) -> String {
    decode_component(slug).replace('_', " ")
}

/// Percent-encode each `/`-separated segment so subpage separators stay literal.
pub fn encode_title(title: &str) -> String {
    title
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop a leading `Namespace:` prefix for titles outside the main namespace.
pub fn strip_namespace(title: &str, namespace: Option<i64>) -> String {
    match namespace {
        Some(0) | None => title.to_string(),
        Some(_) => title
            .split_once(':')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| title.to_string()),
    }
}
