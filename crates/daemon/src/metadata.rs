//! Listings served to the browser's connection form.
//!
//! The front-end populates its environment, product, tag, username and node
//! pickers from these endpoints. The daemon serves static lists taken from
//! configuration; anything smarter plugs in behind [`MetadataService`].

use serde::Serialize;

use crate::config::MetadataConfig;

/// Which listing is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Environments,
    Products,
    Tags,
    Usernames,
    Nodes,
}

/// Source of metadata listings.
pub trait MetadataService: Send + Sync {
    fn list(&self, kind: MetadataKind) -> Vec<String>;
}

/// Serves fixed lists from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    config: MetadataConfig,
}

impl StaticMetadata {
    pub fn new(config: MetadataConfig) -> Self {
        Self { config }
    }
}

impl MetadataService for StaticMetadata {
    fn list(&self, kind: MetadataKind) -> Vec<String> {
        match kind {
            MetadataKind::Environments => self.config.environments.clone(),
            MetadataKind::Products => self.config.products.clone(),
            MetadataKind::Tags => self.config.tags.clone(),
            MetadataKind::Usernames => self.config.usernames.clone(),
            MetadataKind::Nodes => self.config.nodes.clone(),
        }
    }
}

/// JSON envelope the front-end expects: `{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data,
        }
    }
}
