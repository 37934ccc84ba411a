//! Lookup table from site identifier to [`ReviewSource`].
//!
//! Built once at startup and then shared read-only behind an [`Arc`].

use std::collections::HashMap;
use std::sync::Arc;

use super::{HttpSource, ReviewSource, SiteKind};

/// The settings named a site nobody registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown site: {0:?}")]
pub struct UnknownSite(pub String);

#[derive(Default)]
pub struct Registry {
    sources: HashMap<String, Arc<dyn ReviewSource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every [`SiteKind`] pointed at its production API.
    pub fn builtin(client: reqwest::Client) -> Self {
        SiteKind::ALL.into_iter().fold(Self::new(), |registry, kind| {
            registry.with_source(Arc::new(HttpSource::new(kind, client.clone())))
        })
    }

    /// Register `source` under its own id.  A later registration with the
    /// same id replaces the earlier one.
    pub fn with_source(mut self, source: Arc<dyn ReviewSource>) -> Self {
        self.sources.insert(source.id().to_string(), source);
        self
    }

    pub fn resolve(&self, site_id: &str) -> Result<Arc<dyn ReviewSource>, UnknownSite> {
        self.sources
            .get(site_id)
            .cloned()
            .ok_or_else(|| UnknownSite(site_id.to_string()))
    }
}
