//! The engine facade: pipeline stages built once per configuration load, and
//! request scopes that run them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use data_model_smap::config::{I18nStrategy, INDEX_NAME, SitemapConfig, SitemapDefinition, SourceDescriptor};
use data_model_smap::entry::ResolvedEntry;
use data_model_smap::models::{DebugResponse, DocumentSummary, SourceReport};
use futures::future::try_join_all;
use tokio::sync::OnceCell;
use url::Url;

use crate::errors::{Result, SitemapError};
use crate::hooks::{DocumentContext, Hooks, IndexContext, InputContext, ResolvedContext, SourcesContext};
use crate::layout::{ChunkPlan, DocumentTarget, Layout, SitemapGroup, build_index};
use crate::render::{RenderContext, render_index, render_urlset};
use crate::resolve::batch::process_ordered;
use crate::resolve::dedup::dedupe;
use crate::resolve::defaults::{DefaultsMerger, RouteRuleIndex};
use crate::resolve::fetch::{FetchOutcome, RequestMemo, SourceFetcher};
use crate::resolve::filter::FilterEngine;
use crate::resolve::i18n::I18nExpander;
use crate::resolve::normalize::{NormalizePolicy, normalize_entry};

/// A rendered XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    /// Request path the document is served under.
    pub path: String,
    pub body: String,
    /// URLs (or child sitemaps, for the index) in the document.
    pub entries: usize,
}

/// Resolves and renders sitemaps for one configuration.
///
/// Everything derived from the configuration (route-rule index, filters,
/// layout) is built here once; per-request state lives in [`RequestScope`].
#[derive(Debug)]
pub struct SitemapEngine {
    config: SitemapConfig,
    definitions: Vec<SitemapDefinition>,
    policy: NormalizePolicy,
    merger: DefaultsMerger,
    expander: I18nExpander,
    filters: Vec<FilterEngine>,
    layout: Layout,
    fetcher: SourceFetcher,
    hooks: Hooks,
    strict: bool,
}

impl SitemapEngine {
    pub fn new(config: SitemapConfig) -> Result<Self> {
        Self::with_hooks(config, Hooks::default())
    }

    pub fn with_hooks(config: SitemapConfig, hooks: Hooks) -> Result<Self> {
        config.validate()?;
        let policy = NormalizePolicy::from_config(&config)?;
        let rules = RouteRuleIndex::build(&config.route_rules);
        let expander = I18nExpander::new(&config, policy.clone(), rules.clone());

        let locale_prefixes = match &config.i18n {
            Some(i18n) if i18n.strategy != I18nStrategy::NoPrefix && !i18n.uses_domains() => {
                expander.locale_codes().to_vec()
            }
            _ => Vec::new(),
        };
        let merger = DefaultsMerger::new(config.defaults.clone(), rules).with_locale_prefixes(locale_prefixes);

        let definitions = config.definitions().into_owned();
        let multi = config.is_multi();
        let filters = definitions
            .iter()
            .map(|definition| {
                if !multi {
                    return FilterEngine::build(
                        &definition.include,
                        &definition.exclude,
                        &config.internal_prefixes,
                        None,
                    );
                }
                let mut include = definition.include.clone();
                if definition.include_app_sources {
                    include.extend(config.include.iter().cloned());
                }
                let mut exclude = config.exclude.clone();
                exclude.extend(definition.exclude.iter().cloned());
                FilterEngine::build(&include, &exclude, &config.internal_prefixes, Some(definition.name.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;

        let layout = Layout::new(&config, expander.locale_codes());
        let fetcher = SourceFetcher::new(config.source_timeout_ms.map(Duration::from_millis));

        tracing::debug!(
            multi,
            documents = layout.groups().len(),
            locales = expander.locale_codes().len(),
            "sitemap engine ready"
        );

        Ok(Self {
            config,
            definitions,
            policy,
            merger,
            expander,
            filters,
            layout,
            fetcher,
            hooks,
            strict: false,
        })
    }

    /// Treat every source as required: any source failure fails the run.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn config(&self) -> &SitemapConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Start a resolution run. The configured `site_url` wins over the
    /// request origin (`scheme://host`).
    ///
    /// # Errors
    ///
    /// Returns an error when neither is available or the URL is invalid.
    pub fn scope(&self, request_origin: Option<&str>) -> Result<RequestScope<'_>> {
        let site_url = self
            .config
            .site_url
            .as_deref()
            .or(request_origin)
            .ok_or_else(|| SitemapError::InvalidConfig("no site_url configured and no request origin".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let origin = Url::parse(&site_url)?;

        let mut policy = self.policy.clone();
        policy.site_origin = Some(origin.clone());

        Ok(RequestScope {
            engine: self,
            site_url,
            origin,
            policy,
            memo: RequestMemo::new(),
            resolved: Mutex::new(HashMap::new()),
            reports: Mutex::new(Vec::new()),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type ResolvedCell = Arc<OnceCell<Arc<Vec<ResolvedEntry>>>>;

/// One resolution run. Sources and resolved sitemaps are memoized for the
/// lifetime of the scope and never shared with other scopes.
pub struct RequestScope<'a> {
    engine: &'a SitemapEngine,
    site_url: String,
    origin: Url,
    policy: NormalizePolicy,
    memo: RequestMemo,
    resolved: Mutex<HashMap<usize, ResolvedCell>>,
    reports: Mutex<Vec<(String, SourceReport)>>,
}

impl<'a> RequestScope<'a> {
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext::new(&self.site_url, &self.engine.policy.base_path).with_xsl(self.engine.config.xsl.as_deref())
    }

    /// Resolved entries of one sitemap definition, computed once per scope.
    pub async fn resolve_definition(&self, index: usize) -> Result<Arc<Vec<ResolvedEntry>>> {
        let cell = lock(&self.resolved).entry(index).or_default().clone();
        cell.get_or_try_init(|| self.run_pipeline(index)).await.cloned()
    }

    async fn run_pipeline(&self, index: usize) -> Result<Arc<Vec<ResolvedEntry>>> {
        let engine = self.engine;
        let definition = engine
            .definitions
            .get(index)
            .ok_or_else(|| SitemapError::UnknownSitemap(index.to_string()))?;
        let name = definition.name.clone();

        let mut sources = Vec::new();
        if definition.include_app_sources {
            sources.extend(engine.config.app_sources.iter().cloned());
            sources.extend(engine.config.sources.iter().cloned());
            if !engine.config.urls.is_empty() {
                sources.push(SourceDescriptor::Literal(engine.config.urls.clone()));
            }
        }
        sources.extend(definition.sources.iter().cloned());
        if !definition.urls.is_empty() {
            sources.push(SourceDescriptor::Literal(definition.urls.clone()));
        }
        let sources = engine
            .hooks
            .run_sources(SourcesContext {
                sitemap: name.clone(),
                sources,
            })
            .sources;

        let outcomes = process_ordered(
            sources,
            |descriptor, _index| async move {
                let outcome = self.engine.fetcher.fetch(&descriptor, Some(&self.origin), &self.memo).await;
                (descriptor, outcome)
            },
            engine.config.sources_concurrency,
        )
        .await;

        let mut raw = Vec::new();
        for (descriptor, outcome) in outcomes {
            self.record(&descriptor, &outcome, &name);
            if let Some(error) = &outcome.error {
                if descriptor.is_required() || engine.strict {
                    return Err(SitemapError::RequiredSource {
                        source_id: descriptor.label(),
                        reason: error.clone(),
                    });
                }
                continue;
            }
            raw.extend(outcome.entries.iter().cloned());
        }
        let raw = engine
            .hooks
            .run_input(InputContext {
                sitemap: name.clone(),
                entries: raw,
            })
            .entries;

        let mut candidates = Vec::with_capacity(raw.len());
        for entry in raw {
            match normalize_entry(entry, &self.policy) {
                Ok(normalized) => {
                    let merged = engine.merger.merge(normalized, &definition.defaults);
                    candidates.extend(engine.expander.expand(merged));
                }
                Err(e) => tracing::warn!(sitemap = %name, "{}", e),
            }
        }

        let entries = dedupe(engine.filters[index].apply(candidates, &engine.merger));
        let entries = engine
            .hooks
            .run_resolved(ResolvedContext {
                sitemap: name.clone(),
                entries,
            })
            .entries;

        tracing::debug!(sitemap = %name, entries = entries.len(), "sitemap resolved");
        Ok(Arc::new(entries))
    }

    fn record(&self, descriptor: &SourceDescriptor, outcome: &FetchOutcome, sitemap: &str) {
        let identity = descriptor.identity();
        let mut reports = lock(&self.reports);
        if let Some((_, report)) = reports.iter_mut().find(|(id, _)| *id == identity) {
            if !report.sitemaps.iter().any(|s| s == sitemap) {
                report.sitemaps.push(sitemap.to_string());
            }
            return;
        }
        reports.push((
            identity,
            SourceReport {
                source: descriptor.label(),
                sitemaps: vec![sitemap.to_string()],
                entries: outcome.entries.len(),
                dropped: outcome.dropped,
                error: outcome.error.clone(),
                duration_ms: outcome.duration_ms,
            },
        ));
    }

    /// Source reports recorded so far, in first-fetch order.
    pub fn reports(&self) -> Vec<SourceReport> {
        lock(&self.reports).iter().map(|(_, report)| report.clone()).collect()
    }

    /// Entries of one layout group. Locale groups keep entries of their
    /// locale; entries without a locale belong to the default locale.
    pub async fn group_entries(&self, group: usize) -> Result<Vec<ResolvedEntry>> {
        let layout = &self.engine.layout;
        let group = layout
            .groups()
            .get(group)
            .ok_or_else(|| SitemapError::UnknownSitemap(group.to_string()))?;
        let entries = self.resolve_definition(group.definition).await?;

        let Some(code) = &group.locale else {
            return Ok(entries.as_ref().clone());
        };
        let default = self.engine.expander.default_locale();
        Ok(entries
            .iter()
            .filter(|entry| match &entry.locale {
                Some(locale) => &locale.code == code,
                None => default == Some(code.as_str()),
            })
            .cloned()
            .collect())
    }

    /// Resolved entries of a document by file stem (`posts`, `fr-pages`).
    pub async fn resolve_named(&self, name: &str) -> Result<Vec<ResolvedEntry>> {
        let index = self
            .engine
            .layout
            .groups()
            .iter()
            .position(|g| g.file_stem == name || g.sitemap == name)
            .ok_or_else(|| SitemapError::UnknownSitemap(name.to_string()))?;
        self.group_entries(index).await
    }

    async fn all_groups(&self) -> Result<Vec<Vec<ResolvedEntry>>> {
        let groups = 0..self.engine.layout.groups().len();
        try_join_all(groups.map(|index| self.group_entries(index))).await
    }

    /// Render the document served under `path`.
    ///
    /// # Errors
    ///
    /// Not-found errors (see [`SitemapError::is_not_found`]) for unknown
    /// documents and chunks; [`SitemapError::RequiredSource`] when a
    /// required source failed.
    pub async fn render(&self, path: &str) -> Result<RenderedDocument> {
        match self.engine.layout.route(path)? {
            DocumentTarget::Index => self.render_index(path).await,
            DocumentTarget::Group { group, chunk } => self.render_group(path, group, chunk).await,
        }
    }

    async fn render_index(&self, path: &str) -> Result<RenderedDocument> {
        let resolved = self.all_groups().await?;
        let refs = build_index(&self.engine.layout, &resolved, &self.engine.config.append_sitemaps);
        let refs = self.engine.hooks.run_index(IndexContext { sitemaps: refs }).sitemaps;
        Ok(RenderedDocument {
            path: path.to_string(),
            body: render_index(&refs, &self.render_context()),
            entries: refs.len(),
        })
    }

    async fn render_group(&self, path: &str, index: usize, chunk: Option<usize>) -> Result<RenderedDocument> {
        let group = &self.engine.layout.groups()[index];
        let mut entries = self.group_entries(index).await?;
        if let Some(n) = chunk {
            let plan = ChunkPlan::plan(group.file_stem.clone(), entries.len(), group.chunk_size);
            let range = plan.range(n).ok_or_else(|| SitemapError::ChunkNotFound {
                sitemap: group.file_stem.clone(),
                index: n.to_string(),
            })?;
            entries = entries[range].to_vec();
        }

        let entries = self
            .engine
            .hooks
            .run_render(DocumentContext {
                document: group.file_stem.clone(),
                chunk,
                entries,
            })
            .entries;
        Ok(RenderedDocument {
            path: path.to_string(),
            body: render_urlset(&entries, &self.render_context()),
            entries: entries.len(),
        })
    }

    /// Every servable document of the current layout.
    pub async fn summaries(&self) -> Result<Vec<DocumentSummary>> {
        let layout = &self.engine.layout;
        let resolved = self.all_groups().await?;
        let mut out = Vec::new();

        if layout.is_multi() {
            let refs = build_index(layout, &resolved, &self.engine.config.append_sitemaps);
            out.push(DocumentSummary {
                name: format!("{INDEX_NAME}.xml"),
                path: layout.index_path().to_string(),
                sitemap: INDEX_NAME.to_string(),
                locale: None,
                chunk: None,
                entries: refs.len(),
            });
        }

        for (group, entries) in layout.groups().iter().zip(&resolved) {
            let plan = ChunkPlan::plan(group.file_stem.clone(), entries.len(), group.chunk_size);
            if plan.is_chunked() {
                for n in 0..plan.chunk_count {
                    out.push(summary(layout, group, Some(n), plan.range(n).map_or(0, |r| r.len())));
                }
            } else {
                out.push(summary(layout, group, None, entries.len()));
            }
        }
        Ok(out)
    }

    /// Render every document; in multi mode the index appears under both
    /// the default and the index path.
    pub async fn render_all(&self) -> Result<Vec<RenderedDocument>> {
        let layout = &self.engine.layout;
        let mut paths: Vec<String> = self.summaries().await?.into_iter().map(|s| s.path).collect();
        if layout.is_multi() {
            paths.insert(0, layout.default_path().to_string());
        }
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            documents.push(self.render(&path).await?);
        }
        Ok(documents)
    }

    pub async fn debug_report(&self) -> Result<DebugResponse> {
        let documents = self.summaries().await?;
        let cache = &self.engine.config.cache;
        Ok(DebugResponse {
            multi: self.engine.layout.is_multi(),
            documents,
            sources: self.reports(),
            cache_ttl_secs: cache.ttl_secs,
            swr: cache.swr,
        })
    }
}

fn summary(layout: &Layout, group: &SitemapGroup, chunk: Option<usize>, entries: usize) -> DocumentSummary {
    let path = layout.document_path(group, chunk);
    let name = path.rsplit('/').next().unwrap_or(path.as_str()).to_string();
    DocumentSummary {
        name,
        path,
        sitemap: group.sitemap.clone(),
        locale: group.locale.clone(),
        chunk,
        entries,
    }
}
