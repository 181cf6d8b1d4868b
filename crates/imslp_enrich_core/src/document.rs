use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::files::FileRecord;
use crate::wiki::{PageObject, RevisionRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicInfo {
    pub page_name: Option<String>,
    pub page_title: Option<String>,
    pub page_id: Option<i64>,
    pub namespace: Option<i64>,
    pub last_revision: Option<i64>,
}

impl From<&PageObject> for BasicInfo {
    fn from(page: &PageObject) -> Self {
        Self {
            page_name: Some(page.name.clone()),
            page_title: Some(page.page_title.clone()),
            page_id: page.page_id,
            namespace: page.namespace,
            last_revision: page.last_revision,
        }
    }
}

/// The single JSON object printed per run. Every section is always present;
/// a failed section is left empty and gets a `<section>_error` sibling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataDocument {
    pub page_title: String,
    pub url: String,
    pub timestamp: String,
    pub exists: bool,
    #[serde(serialize_with = "empty_object_when_absent")]
    pub basic_info: Option<BasicInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_info_error: Option<String>,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories_error: Option<String>,
    pub files: Vec<FileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_error: Option<String>,
    pub revision_history: Vec<RevisionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_history_error: Option<String>,
}

impl MetadataDocument {
    pub fn new(page_title: String, url: String, timestamp: String) -> Self {
        Self {
            page_title,
            url,
            timestamp,
            exists: false,
            basic_info: None,
            basic_info_error: None,
            categories: Vec::new(),
            categories_error: None,
            files: Vec::new(),
            files_error: None,
            revision_history: Vec::new(),
            revision_history_error: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn empty_object_when_absent<S>(value: &Option<BasicInfo>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(info) => info.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}
