use chrono::Local;
use tracing::info;

use crate::config::EnrichConfig;
use crate::document::MetadataDocument;
use crate::files::FileMerger;
use crate::http::Fetcher;
use crate::poll::wait_for_existence;
use crate::resolve::TargetResolver;
use crate::sections::SectionAggregator;
use crate::site::WikiSite;
use crate::wiki::WikiClient;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Resolve a target, wait for its page, and aggregate every section into one document.
pub struct Enricher<'a> {
    config: &'a EnrichConfig,
    site: &'a WikiSite,
    fetcher: Fetcher<'a>,
    wiki: &'a dyn WikiClient,
}

impl<'a> Enricher<'a> {
    pub fn new(
        config: &'a EnrichConfig,
        site: &'a WikiSite,
        fetcher: Fetcher<'a>,
        wiki: &'a dyn WikiClient,
    ) -> Self {
        Self {
            config,
            site,
            fetcher,
            wiki,
        }
    }

    pub fn resolve(&self, target: &str) -> String {
        TargetResolver::new(
            self.fetcher,
            self.site,
            self.config.lookup_policy(),
            self.config.scrape_policy(),
        )
        .resolve(target)
    }

    pub fn run(&self, target: &str) -> MetadataDocument {
        let title = self.resolve(target);
        info!(target, %title, "resolved target");

        let page = wait_for_existence(
            self.wiki,
            self.fetcher.sleeper(),
            &title,
            self.config.poll_attempts(),
            self.config.poll_delay(),
        );

        let mut document = MetadataDocument::new(
            title.clone(),
            self.site.page_url(&title),
            Local::now().format(TIMESTAMP_FORMAT).to_string(),
        );
        document.exists = page.as_ref().is_ok_and(|page| page.exists);

        let merger = FileMerger::new(
            self.fetcher,
            &self.site.api_url,
            self.config.enrich_policy(),
        );
        SectionAggregator::new(self.wiki, &merger).populate(&mut document, &page);
        info!(
            exists = document.exists,
            categories = document.categories.len(),
            files = document.files.len(),
            revisions = document.revision_history.len(),
            "document assembled"
        );
        document
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Enricher;
    use crate::config::EnrichConfig;
    use crate::document::MetadataDocument;
    use crate::http::{Fetcher, HttpResponse};
    use crate::site::WikiSite;
    use crate::testing::{RecordingSleeper, ScriptedTransport, StubWiki};
    use crate::wiki::{ImageEntry, ImageInfo, RevisionRecord};

    fn run(transport: &ScriptedTransport, wiki: &StubWiki, target: &str) -> MetadataDocument {
        let config = EnrichConfig::default();
        let site = WikiSite::from_config(&config).expect("site");
        let sleeper = RecordingSleeper::default();
        Enricher::new(&config, &site, Fetcher::new(transport, &sleeper), wiki).run(target)
    }

    fn score_image(url: &str) -> ImageEntry {
        ImageEntry {
            name: Some("File:PMLP01234-Score.pdf".to_string()),
            title: Some("File:PMLP01234-Score.pdf".to_string()),
            imageinfo: Some(ImageInfo {
                url: Some(url.to_string()),
                ..ImageInfo::default()
            }),
        }
    }

    fn revision(revid: i64) -> RevisionRecord {
        RevisionRecord {
            revid: Some(revid),
            user: Some("Editor".to_string()),
            timestamp: Some("2023-11-02T08:00:00Z".to_string()),
            comment: Some("tidy".to_string()),
        }
    }

    #[test]
    fn permalink_target_needs_no_resolution_requests() {
        let transport = ScriptedTransport::unreachable();
        let wiki = StubWiki::existing("Ave Maria (Bach-Gounod)");

        let document = run(&transport, &wiki, "https://imslp.org/wiki/Ave_Maria_(Bach-Gounod)");

        assert_eq!(document.page_title, "Ave Maria (Bach-Gounod)");
        assert_eq!(
            document.url,
            "https://imslp.org/wiki/Ave%20Maria%20%28Bach-Gounod%29"
        );
        assert!(document.exists);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(document.timestamp.len(), "2024-01-01T00:00:00".len());
        assert_eq!(&document.timestamp[10..11], "T");
    }

    #[test]
    fn numeric_target_resolves_through_structured_lookup() {
        let transport = ScriptedTransport::new(|request| {
            assert_eq!(request.param("pageids"), Some("12345"));
            Ok(HttpResponse::new(
                200,
                r#"{"query":{"pages":{"12345":{"title":"Symphony No.5"}}}}"#,
            ))
        });
        let wiki = StubWiki::existing("Symphony No.5");

        let document = run(&transport, &wiki, "12345");

        assert_eq!(document.page_title, "Symphony No.5");
        assert_eq!(document.url, "https://imslp.org/wiki/Symphony%20No.5");
        let basic_info = document.basic_info.expect("basic info");
        assert_eq!(basic_info.page_name.as_deref(), Some("Symphony No.5"));
    }

    #[test]
    fn failing_categories_do_not_block_other_sections() {
        let transport = ScriptedTransport::new(|request| {
            assert_eq!(request.param("prop"), Some("imageinfo"));
            Ok(HttpResponse::new(
                200,
                r#"{"query":{"pages":{"5":{"title":"File:PMLP01234-Score.pdf","imageinfo":[{"url":"https://imslp.org/images/0/01/PMLP01234-Score.pdf","size":4096,"mime":"application/pdf"}]}}}}"#,
            ))
        });
        let mut wiki = StubWiki::existing("Piano Sonata No.14 (Beethoven)");
        wiki.categories = Err("category listing timed out".to_string());
        wiki.images = Ok(vec![score_image("//imslp.org/images/0/01/PMLP01234-Score.pdf")]);
        wiki.revisions = Ok(vec![revision(3), revision(2)]);

        let document = run(&transport, &wiki, "Piano_Sonata_No.14_(Beethoven)");
        let value = serde_json::to_value(&document).expect("json");

        assert_eq!(value["categories"], json!([]));
        assert_eq!(value["categories_error"], json!("category listing timed out"));
        assert_eq!(value["files"][0]["name"], json!("File:PMLP01234-Score.pdf"));
        assert_eq!(value["files"][0]["size"], json!(4096));
        assert_eq!(value["files"][0]["mime_type"], json!("application/pdf"));
        assert_eq!(
            value["files"][0]["download_urls"]["direct"],
            json!("https://imslp.org/images/0/01/PMLP01234-Score.pdf")
        );
        assert_eq!(value["revision_history"][0]["revid"], json!(3));
        assert!(value.get("files_error").is_none());
        assert!(value.get("revision_history_error").is_none());
    }

    #[test]
    fn unmatched_http_file_gets_https_download_url() {
        let transport =
            ScriptedTransport::new(|_| Ok(HttpResponse::new(200, r#"{"query":{"pages":{}}}"#)));
        let mut wiki = StubWiki::existing("X");
        wiki.images = Ok(vec![score_image("http://imslp.org/x.pdf")]);

        let document = run(&transport, &wiki, "X");

        let urls = &document.files[0].download_urls;
        assert_eq!(urls.original.as_deref(), Some("http://imslp.org/x.pdf"));
        assert_eq!(urls.https.as_deref(), Some("https://imslp.org/x.pdf"));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn unavailable_page_still_yields_a_document() {
        let transport = ScriptedTransport::unreachable();
        let wiki = StubWiki {
            page: Err("MediaWiki API request failed with HTTP 502".to_string()),
            categories: Err("down".to_string()),
            images: Err("down".to_string()),
            revisions: Err("down".to_string()),
        };

        let document = run(&transport, &wiki, "Lost_Page");
        let value = serde_json::to_value(&document).expect("json");

        assert_eq!(value["page_title"], json!("Lost_Page"));
        assert_eq!(value["exists"], json!(false));
        assert_eq!(value["basic_info"], json!({}));
        assert_eq!(
            value["basic_info_error"],
            json!("MediaWiki API request failed with HTTP 502")
        );
        assert_eq!(value["files_error"], json!("down"));
    }
}
