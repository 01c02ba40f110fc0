//! Extension hooks: ordered `context -> context` transforms run at fixed
//! checkpoints of one resolution run.

use std::fmt;
use std::sync::Arc;

use data_model_smap::config::{IndexReference, SourceDescriptor};
use data_model_smap::entry::{RawEntry, ResolvedEntry};

/// Source list of one sitemap, before any fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesContext {
    pub sitemap: String,
    pub sources: Vec<SourceDescriptor>,
}

/// Raw entries of one sitemap, after fetching.
#[derive(Debug, Clone, PartialEq)]
pub struct InputContext {
    pub sitemap: String,
    pub entries: Vec<RawEntry>,
}

/// Resolved entries of one sitemap, after deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContext {
    pub sitemap: String,
    pub entries: Vec<ResolvedEntry>,
}

/// Entries of one document about to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContext {
    /// Document file stem, e.g. `posts` or `fr-pages`.
    pub document: String,
    pub chunk: Option<usize>,
    pub entries: Vec<ResolvedEntry>,
}

/// Child references of the index document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexContext {
    pub sitemaps: Vec<IndexReference>,
}

pub type Hook<C> = Arc<dyn Fn(C) -> C + Send + Sync>;

fn run<C>(hooks: &[Hook<C>], ctx: C) -> C {
    hooks.iter().fold(ctx, |ctx, hook| hook(ctx))
}

/// Registered hooks, invoked in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    sources: Vec<Hook<SourcesContext>>,
    input: Vec<Hook<InputContext>>,
    resolved: Vec<Hook<ResolvedContext>>,
    render: Vec<Hook<DocumentContext>>,
    index: Vec<Hook<IndexContext>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("sources", &self.sources.len())
            .field("input", &self.input.len())
            .field("resolved", &self.resolved.len())
            .field("render", &self.render.len())
            .field("index", &self.index.len())
            .finish()
    }
}

impl Hooks {
    /// Creates a new builder for Hooks.
    pub fn builder() -> HooksBuilder {
        HooksBuilder::default()
    }

    pub fn run_sources(&self, ctx: SourcesContext) -> SourcesContext {
        run(&self.sources, ctx)
    }

    pub fn run_input(&self, ctx: InputContext) -> InputContext {
        run(&self.input, ctx)
    }

    pub fn run_resolved(&self, ctx: ResolvedContext) -> ResolvedContext {
        run(&self.resolved, ctx)
    }

    pub fn run_render(&self, ctx: DocumentContext) -> DocumentContext {
        run(&self.render, ctx)
    }

    pub fn run_index(&self, ctx: IndexContext) -> IndexContext {
        run(&self.index, ctx)
    }
}

/// Builder for Hooks.
#[derive(Default)]
pub struct HooksBuilder {
    hooks: Hooks,
}

impl HooksBuilder {
    /// Mutates a sitemap's source list before memoization keys are computed.
    pub fn on_sources(mut self, hook: impl Fn(SourcesContext) -> SourcesContext + Send + Sync + 'static) -> Self {
        self.hooks.sources.push(Arc::new(hook));
        self
    }

    /// Mutates the fetched entry list before normalization.
    pub fn on_input(mut self, hook: impl Fn(InputContext) -> InputContext + Send + Sync + 'static) -> Self {
        self.hooks.input.push(Arc::new(hook));
        self
    }

    /// Mutates the final resolved entries of a sitemap.
    pub fn on_resolved(mut self, hook: impl Fn(ResolvedContext) -> ResolvedContext + Send + Sync + 'static) -> Self {
        self.hooks.resolved.push(Arc::new(hook));
        self
    }

    /// Mutates one document's entries right before rendering.
    pub fn on_render(mut self, hook: impl Fn(DocumentContext) -> DocumentContext + Send + Sync + 'static) -> Self {
        self.hooks.render.push(Arc::new(hook));
        self
    }

    /// Mutates the index references.
    pub fn on_index(mut self, hook: impl Fn(IndexContext) -> IndexContext + Send + Sync + 'static) -> Self {
        self.hooks.index.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Hooks {
        self.hooks
    }
}
