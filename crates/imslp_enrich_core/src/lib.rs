pub mod config;
pub mod document;
pub mod error;
pub mod files;
pub mod http;
pub mod pipeline;
pub mod poll;
pub mod resolve;
pub mod sections;
pub mod site;
pub mod wiki;

#[cfg(test)]
pub(crate) mod testing;

pub use document::MetadataDocument;
pub use error::EnrichError;
pub use pipeline::Enricher;
