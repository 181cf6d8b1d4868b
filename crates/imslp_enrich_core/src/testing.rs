use std::cell::RefCell;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::error::EnrichError;
use crate::http::{HttpResponse, HttpTransport, Sleeper};
use crate::wiki::{ImageEntry, PageObject, RevisionRecord, WikiClient};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

type Handler = Box<dyn Fn(&RecordedRequest) -> Result<HttpResponse, EnrichError>>;

pub struct ScriptedTransport {
    handler: Handler,
    calls: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&RecordedRequest) -> Result<HttpResponse, EnrichError> + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// A transport that fails the test if anything reaches it.
    pub fn unreachable() -> Self {
        Self::new(|request| panic!("unexpected request to {}", request.url))
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.calls.borrow().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, EnrichError> {
        let request = RecordedRequest {
            url: url.to_string(),
            params: params
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
            timeout,
        };
        self.calls.borrow_mut().push(request.clone());
        (self.handler)(&request)
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Wiki client with canned per-call outcomes; `Err` strings become lookup errors.
pub struct StubWiki {
    pub page: Result<PageObject, String>,
    pub categories: Result<Vec<String>, String>,
    pub images: Result<Vec<ImageEntry>, String>,
    pub revisions: Result<Vec<RevisionRecord>, String>,
}

impl StubWiki {
    pub fn existing(title: &str) -> Self {
        Self {
            page: Ok(PageObject {
                name: title.to_string(),
                page_title: title.to_string(),
                page_id: Some(1),
                namespace: Some(0),
                last_revision: Some(100),
                exists: true,
            }),
            categories: Ok(Vec::new()),
            images: Ok(Vec::new()),
            revisions: Ok(Vec::new()),
        }
    }
}

impl WikiClient for StubWiki {
    fn page(&self, _title: &str) -> Result<PageObject> {
        self.page.clone().map_err(|message| anyhow!(message))
    }

    fn categories(&self, _title: &str) -> Result<Vec<String>> {
        self.categories.clone().map_err(|message| anyhow!(message))
    }

    fn images(&self, _title: &str, _limit: usize) -> Result<Vec<ImageEntry>> {
        self.images.clone().map_err(|message| anyhow!(message))
    }

    fn revisions(&self, _title: &str, _limit: usize) -> Result<Vec<RevisionRecord>> {
        self.revisions.clone().map_err(|message| anyhow!(message))
    }
}
