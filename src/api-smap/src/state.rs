use std::sync::Arc;
use std::time::Duration;

use core_smap::SitemapEngine;

use crate::cache::DocumentCache;

/// Shared router state: one engine per configuration and the document cache.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<SitemapEngine>,
    pub cache: Arc<DocumentCache>,
}

impl AppState {
    /// Cache TTL and SWR mode come from the engine's `cache` settings.
    pub fn new(engine: SitemapEngine) -> Self {
        let settings = &engine.config().cache;
        let cache = DocumentCache::new(Duration::from_secs(settings.ttl_secs), settings.swr);
        Self {
            engine: Arc::new(engine),
            cache: Arc::new(cache),
        }
    }
}
