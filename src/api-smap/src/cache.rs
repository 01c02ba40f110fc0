//! Per-key document cache with single-flight regeneration and optional
//! stale-while-revalidate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use core_smap::{RenderedDocument, Result};

/// How a cached response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Stale,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Stale => "STALE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedDocument {
    pub document: Arc<RenderedDocument>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    fresh_until: Instant,
}

impl CachedDocument {
    fn new(document: RenderedDocument, ttl: Duration) -> Self {
        let generated_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| generated_at.checked_add_signed(ttl))
            .unwrap_or(generated_at);
        Self {
            document: Arc::new(document),
            generated_at,
            expires_at,
            fresh_until: Instant::now() + ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.fresh_until
    }

    /// Whole seconds of freshness left; zero once stale.
    pub fn remaining_secs(&self) -> u64 {
        self.fresh_until.saturating_duration_since(Instant::now()).as_secs()
    }
}

#[derive(Default)]
struct Slot {
    value: RwLock<Option<CachedDocument>>,
    generating: tokio::sync::Mutex<()>,
    refreshing: AtomicBool,
}

impl Slot {
    fn current(&self) -> Option<CachedDocument> {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn store(&self, cached: CachedDocument) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(cached);
    }
}

/// Slot count above which expired, idle slots are swept before a new key is
/// admitted.
const MAX_SLOTS: usize = 1024;

/// Shared across requests. Request-scoped source memoization never lands
/// here; only rendered documents do. Failed generations leave no slot behind.
pub struct DocumentCache {
    ttl: Duration,
    swr: bool,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache")
            .field("ttl", &self.ttl)
            .field("swr", &self.swr)
            .finish_non_exhaustive()
    }
}

impl DocumentCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration, swr: bool) -> Self {
        Self {
            ttl,
            swr,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn slot(&self, key: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(key) {
            return slot.clone();
        }
        if slots.len() >= MAX_SLOTS {
            // Keys are built from request headers, so unused ones must not pile up.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1 || slot.current().is_some_and(|c| c.is_fresh()));
            tracing::debug!(remaining = slots.len(), "swept idle cache slots");
        }
        let slot = Arc::new(Slot::default());
        slots.insert(key.to_string(), slot.clone());
        slot
    }

    /// Drops `slot` from the map if it never produced a document.
    fn discard_if_empty(&self, key: &str, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.current().is_none() && slots.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(key);
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached document for `key`, generating it with `generate` when missing
    /// or expired.
    ///
    /// Concurrent callers for one key share a single generation. With SWR an
    /// expired document is returned immediately while one background task
    /// regenerates it; otherwise callers wait for the regeneration.
    pub async fn get_or_generate<F, Fut>(&self, key: &str, generate: F) -> Result<(CachedDocument, CacheStatus)>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RenderedDocument>> + Send + 'static,
    {
        if !self.is_enabled() {
            let document = generate().await?;
            return Ok((CachedDocument::new(document, Duration::ZERO), CacheStatus::Miss));
        }

        let slot = self.slot(key);
        match slot.current() {
            Some(cached) if cached.is_fresh() => return Ok((cached, CacheStatus::Hit)),
            Some(stale) if self.swr => {
                self.refresh_in_background(key, slot.clone(), generate);
                return Ok((stale, CacheStatus::Stale));
            }
            _ => {}
        }

        let _generating = slot.generating.lock().await;
        if let Some(cached) = slot.current().filter(CachedDocument::is_fresh) {
            return Ok((cached, CacheStatus::Hit));
        }
        tracing::debug!(key, "generating sitemap document");
        let document = match generate().await {
            Ok(document) => document,
            Err(e) => {
                self.discard_if_empty(key, &slot);
                return Err(e);
            }
        };
        let cached = CachedDocument::new(document, self.ttl);
        slot.store(cached.clone());
        Ok((cached, CacheStatus::Miss))
    }

    fn refresh_in_background<F, Fut>(&self, key: &str, slot: Arc<Slot>, generate: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RenderedDocument>> + Send + 'static,
    {
        if slot.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let ttl = self.ttl;
        let key = key.to_string();
        tokio::spawn(async move {
            {
                let _generating = slot.generating.lock().await;
                match generate().await {
                    Ok(document) => {
                        slot.store(CachedDocument::new(document, ttl));
                        tracing::debug!(key, "refreshed stale sitemap document");
                    }
                    Err(e) => tracing::warn!(key, error = %e, "background sitemap regeneration failed"),
                }
            }
            slot.refreshing.store(false, Ordering::Release);
        });
    }
}
