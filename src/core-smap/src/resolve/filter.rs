//! Include/exclude filtering of resolved entries.

use data_model_smap::config::FilterPattern;
use data_model_smap::entry::ResolvedEntry;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::RegexSet;

use crate::errors::Result;
use crate::resolve::defaults::DefaultsMerger;
use crate::resolve::i18n::Candidate;

/// Compiled include or exclude patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    globs: GlobSet,
    regexes: RegexSet,
    len: usize,
}

impl PatternSet {
    /// Compile glob and regex patterns.
    ///
    /// `*` matches within one path segment and `**` across segments. A
    /// trailing `/**` also matches the directory itself, so `/blog/**`
    /// covers `/blog`.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex is invalid.
    pub fn build(patterns: &[FilterPattern]) -> Result<Self> {
        let mut globs = GlobSetBuilder::new();
        let mut regexes = Vec::new();
        for pattern in patterns {
            match pattern {
                FilterPattern::Glob(glob) => {
                    globs.add(GlobBuilder::new(glob).literal_separator(true).build()?);
                    if let Some(base) = glob.strip_suffix("/**").filter(|b| !b.is_empty()) {
                        globs.add(GlobBuilder::new(base).literal_separator(true).build()?);
                    }
                }
                FilterPattern::Regex { regex } => regexes.push(regex.as_str()),
            }
        }
        Ok(Self {
            globs: globs.build()?,
            regexes: RegexSet::new(regexes)?,
            len: patterns.len(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Trailing slashes are ignored, so `/blog/*` matches `/blog/a/`.
    pub fn is_match(&self, path: &str) -> bool {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        [path, trimmed]
            .iter()
            .any(|p| self.globs.is_match(p) || self.regexes.is_match(p))
    }
}

/// Per-sitemap filter: route-rule veto, excludes, includes, internal paths
/// and sitemap pinning.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    include: PatternSet,
    exclude: PatternSet,
    internal_prefixes: Vec<String>,
    /// Named sitemap being filtered; `None` in single-sitemap mode.
    sitemap: Option<String>,
}

impl FilterEngine {
    pub fn build(
        include: &[FilterPattern],
        exclude: &[FilterPattern],
        internal_prefixes: &[String],
        sitemap: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            include: PatternSet::build(include)?,
            exclude: PatternSet::build(exclude)?,
            internal_prefixes: internal_prefixes.to_vec(),
            sitemap: sitemap.map(str::to_string),
        })
    }

    /// Whether an entry survives include/exclude filtering. Patterns are
    /// tested against the canonical (unprefixed) path, so one rule covers
    /// every locale variant. External entries are never filtered by path.
    pub fn should_keep(&self, entry: &ResolvedEntry) -> bool {
        if entry.is_external() && entry.locale.is_none() {
            return true;
        }
        let path = entry.canonical_path.as_str();

        if self.exclude.is_match(path) {
            return false;
        }
        let included = !self.include.is_empty() && self.include.is_match(path);
        if self.is_internal(path) && !included {
            return false;
        }
        self.include.is_empty() || included
    }

    fn is_internal(&self, path: &str) -> bool {
        self.internal_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn pinned_elsewhere(&self, entry: &ResolvedEntry) -> bool {
        match (&self.sitemap, &entry.sitemap) {
            (Some(current), Some(pinned)) => current != pinned,
            _ => false,
        }
    }

    /// Apply every filter in order and drop alternates that point at vetoed
    /// paths.
    pub fn apply(&self, candidates: Vec<Candidate>, merger: &DefaultsMerger) -> Vec<ResolvedEntry> {
        candidates
            .into_iter()
            .filter_map(|Candidate { mut entry, indexable }| {
                if !indexable {
                    tracing::debug!(key = %entry.key, "dropped by route rule");
                    return None;
                }
                if self.pinned_elsewhere(&entry) {
                    return None;
                }
                if !self.should_keep(&entry) {
                    tracing::trace!(key = %entry.key, "dropped by filter");
                    return None;
                }
                if !merger.rules().is_empty() {
                    entry
                        .alternates
                        .retain(|alt| !alt.href.starts_with('/') || merger.is_indexable(&alt.href));
                }
                Some(entry)
            })
            .collect()
    }
}
