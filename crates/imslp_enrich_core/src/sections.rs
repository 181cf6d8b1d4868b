use anyhow::{Result, anyhow};
use tracing::warn;

use crate::document::{BasicInfo, MetadataDocument};
use crate::files::{FileMerger, FileRecord, MAX_FILES};
use crate::wiki::{PageObject, RevisionRecord, WikiClient};

pub const REVISION_LIMIT: usize = 5;

/// Fills the four sections of a document independently of one another.
pub struct SectionAggregator<'a> {
    wiki: &'a dyn WikiClient,
    merger: &'a FileMerger<'a>,
}

impl<'a> SectionAggregator<'a> {
    pub fn new(wiki: &'a dyn WikiClient, merger: &'a FileMerger<'a>) -> Self {
        Self { wiki, merger }
    }

    pub fn populate(&self, document: &mut MetadataDocument, page: &Result<PageObject>) {
        let title = document.page_title.clone();

        (document.basic_info, document.basic_info_error) =
            settle("basic_info", basic_info(page));
        (document.categories, document.categories_error) =
            settle("categories", self.categories(&title));
        (document.files, document.files_error) = settle("files", self.files(&title));
        (document.revision_history, document.revision_history_error) =
            settle("revision_history", self.revision_history(&title));
    }

    fn categories(&self, title: &str) -> Result<Vec<String>> {
        self.wiki.categories(title)
    }

    fn files(&self, title: &str) -> Result<Vec<FileRecord>> {
        let images = self.wiki.images(title, MAX_FILES)?;
        Ok(self.merger.merge(&images))
    }

    fn revision_history(&self, title: &str) -> Result<Vec<RevisionRecord>> {
        let mut revisions = self.wiki.revisions(title, REVISION_LIMIT)?;
        revisions.truncate(REVISION_LIMIT);
        Ok(revisions)
    }
}

fn basic_info(page: &Result<PageObject>) -> Result<Option<BasicInfo>> {
    match page {
        Ok(page) => Ok(Some(BasicInfo::from(page))),
        Err(error) => Err(anyhow!("{error:#}")),
    }
}

/// Section value plus its `_error` sibling.
fn settle<T: Default>(section: &str, result: Result<T>) -> (T, Option<String>) {
    match result {
        Ok(value) => (value, None),
        Err(error) => {
            let message = format!("{error:#}");
            warn!(section, error = %message, "section failed");
            (T::default(), Some(message))
        }
    }
}
