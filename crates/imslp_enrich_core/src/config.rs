use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::http::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://imslp.org";
pub const DEFAULT_API_URL: &str = "https://imslp.org/w/api.php";
pub const DEFAULT_INDEX_URL: &str = "https://imslp.org/index.php";
pub const DEFAULT_ARTICLE_PATH: &str = "/wiki/$1";
pub const DEFAULT_USER_AGENT: &str = "OurTextScores/1.0 (+https://ourtextscores.example)";
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".imslp_enrich/config.toml";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct EnrichConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub poll: PollSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub base_url: Option<String>,
    pub api_url: Option<String>,
    pub index_url: Option<String>,
    pub article_path: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub enrich_timeout_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PollSection {
    pub attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

impl EnrichConfig {
    /// Resolve the wiki base URL: env IMSLP_URL > config > DEFAULT_BASE_URL.
    pub fn base_url(&self) -> String {
        let value = env_string("IMSLP_URL")
            .or_else(|| self.wiki.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        value.trim_end_matches('/').to_string()
    }

    /// Resolve the Action API URL: env IMSLP_API_URL > config > derived from base_url.
    pub fn api_url(&self) -> String {
        env_string("IMSLP_API_URL")
            .or_else(|| self.wiki.api_url.clone())
            .unwrap_or_else(|| {
                if self.wiki.base_url.is_none() && env_string("IMSLP_URL").is_none() {
                    DEFAULT_API_URL.to_string()
                } else {
                    format!("{}/w/api.php", self.base_url())
                }
            })
    }

    /// Resolve the `index.php` URL used for `curid` lookups.
    pub fn index_url(&self) -> String {
        env_string("IMSLP_INDEX_URL")
            .or_else(|| self.wiki.index_url.clone())
            .unwrap_or_else(|| {
                if self.wiki.base_url.is_none() && env_string("IMSLP_URL").is_none() {
                    DEFAULT_INDEX_URL.to_string()
                } else {
                    format!("{}/index.php", self.base_url())
                }
            })
    }

    pub fn article_path(&self) -> String {
        env_string("IMSLP_ARTICLE_PATH")
            .or_else(|| self.wiki.article_path.clone())
            .unwrap_or_else(|| DEFAULT_ARTICLE_PATH.to_string())
    }

    pub fn user_agent(&self) -> String {
        env_string("IMSLP_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Policy for ordinary API lookups (info-by-pageid, page object queries).
    pub fn lookup_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            timeout: Duration::from_millis(env_u64(
                "IMSLP_HTTP_TIMEOUT_MS",
                self.http.timeout_ms,
                duration_ms(defaults.timeout),
            )),
            max_attempts: env_u32(
                "IMSLP_HTTP_ATTEMPTS",
                self.http.max_attempts,
                defaults.max_attempts,
            ),
            initial_delay: Duration::from_millis(env_u64(
                "IMSLP_HTTP_RETRY_DELAY_MS",
                self.http.initial_delay_ms,
                duration_ms(defaults.initial_delay),
            )),
            backoff_multiplier: self
                .http
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        }
    }

    /// Policy for batched imageinfo requests; same retry budget, longer timeout.
    pub fn enrich_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(env_u64(
                "IMSLP_HTTP_ENRICH_TIMEOUT_MS",
                self.http.enrich_timeout_ms,
                20_000,
            )),
            ..self.lookup_policy()
        }
    }

    /// Single attempt, used by the canonical-link scrape.
    pub fn scrape_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            ..self.lookup_policy()
        }
    }

    pub fn poll_attempts(&self) -> u32 {
        env_u32("IMSLP_POLL_ATTEMPTS", self.poll.attempts, 3)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(env_u64("IMSLP_POLL_DELAY_MS", self.poll.delay_ms, 2_000))
    }

    /// Check that every URL the pipeline needs is absolute and that the article
    /// path carries its `$1` placeholder.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("base_url", self.base_url()),
            ("api_url", self.api_url()),
            ("index_url", self.index_url()),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                bail!("{label} must be an absolute http(s) URL, got {value:?}");
            }
        }
        if !self.article_path().contains("$1") {
            bail!("article_path must contain the $1 placeholder");
        }
        let multiplier = self.lookup_policy().backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            bail!("backoff_multiplier must be a non-negative finite number");
        }
        Ok(())
    }
}

/// Pick the config file: explicit flag > env IMSLP_ENRICH_CONFIG > `.imslp_enrich/config.toml` under `cwd`.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(value) = env_string("IMSLP_ENRICH_CONFIG") {
        return PathBuf::from(value);
    }
    cwd.join(DEFAULT_CONFIG_RELATIVE_PATH)
}

/// Load and parse an EnrichConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<EnrichConfig> {
    if !config_path.exists() {
        return Ok(EnrichConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: EnrichConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str, configured: Option<u64>, default: u64) -> u64 {
    env_string(key)
        .and_then(|value| value.parse::<u64>().ok())
        .or(configured)
        .unwrap_or(default)
}

fn env_u32(key: &str, configured: Option<u32>, default: u32) -> u32 {
    env_string(key)
        .and_then(|value| value.parse::<u32>().ok())
        .or(configured)
        .unwrap_or(default)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_points_at_imslp() {
        let config = EnrichConfig::default();
        assert!(config.wiki.base_url.is_none());
        assert_eq!(config.article_path(), "/wiki/$1");
        assert_eq!(config.lookup_policy().max_attempts, 3);
        assert_eq!(config.enrich_policy().timeout, Duration::from_secs(20));
        assert_eq!(config.scrape_policy().max_attempts, 1);
        assert_eq!(config.poll_delay(), Duration::from_secs(2));
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, EnrichConfig::default());
    }

    #[test]
    fn load_config_parses_all_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
base_url = "https://mirror.example.org/"
article_path = "/w/$1"
user_agent = "test-agent/1.0"

[http]
timeout_ms = 5000
enrich_timeout_ms = 9000
max_attempts = 5
initial_delay_ms = 10
backoff_multiplier = 2.0

[poll]
attempts = 1
delay_ms = 50
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.base_url.as_deref(),
            Some("https://mirror.example.org/")
        );
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.http.max_attempts, Some(5));
        assert_eq!(config.http.backoff_multiplier, Some(2.0));
        assert_eq!(config.poll.attempts, Some(1));
        assert_eq!(config.poll.delay_ms, Some(50));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[other]\nkey = \"value\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.wiki.api_url.is_none());
        assert!(config.poll.attempts.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nbase_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn validate_rejects_relative_urls_and_missing_placeholder() {
        let mut config = EnrichConfig::default();
        config.wiki.api_url = Some("/w/api.php".to_string());
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.wiki.article_path = Some("/wiki/".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_config_flag_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/enrich.toml")), Path::new("/work"));
        assert_eq!(path, PathBuf::from("/etc/enrich.toml"));
    }
}
