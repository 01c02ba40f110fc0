//! Locale expansion: one logical route becomes one entry per enabled locale,
//! each carrying the full set of `hreflang` alternates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use data_model_smap::config::{I18nConfig, I18nStrategy, LocaleConfig, PagePath, SitemapConfig};
use data_model_smap::entry::{Alternate, EntryLocale, ParsedLoc, ResolvedEntry};

use crate::errors::SitemapError;
use crate::resolve::defaults::{MergedEntry, RouteRuleIndex, split_locale_prefix};
use crate::resolve::normalize::{NormalizePolicy, NormalizedEntry};

/// hreflang of the fallback alternate.
pub const X_DEFAULT: &str = "x-default";

/// A resolved entry on its way to the filter stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: ResolvedEntry,
    /// False when a route rule vetoed the entry.
    pub indexable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param,
    CatchAll,
}

/// A route path with dynamic segments: `/blog/[slug]`, `/docs/[...path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with("[...") && s.ends_with(']') {
                    Segment::CatchAll
                } else if (s.starts_with('[') && s.ends_with(']')) || s.starts_with(':') {
                    Segment::Param
                } else {
                    Segment::Static(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Captured parameters, in template order, when `path` matches.
    pub fn matches(&self, path: &str) -> Option<Vec<String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll => {
                    if i >= parts.len() {
                        return None;
                    }
                    params.push(parts[i..].join("/"));
                    return Some(params);
                }
                Segment::Param => params.push((*parts.get(i)?).to_string()),
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }

    /// Substitute parameters positionally. `None` when too few are given.
    pub fn render(&self, params: &[String]) -> Option<String> {
        let mut next = params.iter();
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(s) => out.push_str(s),
                Segment::Param | Segment::CatchAll => out.push_str(next.next()?),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        Some(out)
    }

    fn specificity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalePath {
    Disabled,
    Custom(RouteTemplate),
}

#[derive(Debug, Clone)]
struct PageRoute {
    template: RouteTemplate,
    locales: HashMap<String, LocalePath>,
}

/// Custom per-locale paths, keyed by the default route template.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    routes: Vec<PageRoute>,
}

impl PageMap {
    pub fn build(config: &I18nConfig) -> Self {
        let routes = config
            .pages
            .iter()
            .map(|(template, per_locale)| {
                let locales = per_locale
                    .iter()
                    .filter_map(|(code, path)| {
                        let path = match path {
                            PagePath::Enabled(false) => LocalePath::Disabled,
                            PagePath::Enabled(true) => return None,
                            PagePath::Custom(custom) => LocalePath::Custom(RouteTemplate::parse(custom)),
                        };
                        Some((code.clone(), path))
                    })
                    .collect();
                PageRoute {
                    template: RouteTemplate::parse(template),
                    locales,
                }
            })
            .collect();
        Self { routes }
    }

    /// Find the route a locale's path belongs to. The most static template
    /// wins; ties go to the first declared.
    fn lookup(&self, locale: &str, path: &str) -> Option<(&PageRoute, Vec<String>)> {
        let mut best: Option<(usize, &PageRoute, Vec<String>)> = None;
        for route in &self.routes {
            let template = match route.locales.get(locale) {
                Some(LocalePath::Custom(custom)) => custom,
                _ => &route.template,
            };
            if let Some(params) = template.matches(path) {
                let score = template.specificity();
                if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                    best = Some((score, route, params));
                }
            }
        }
        best.map(|(_, route, params)| (route, params))
    }
}

/// The locale path for one route: `None` when the locale is disabled.
fn locale_path(route: Option<&(&PageRoute, Vec<String>)>, code: &str, canonical: &str) -> Option<String> {
    let Some((route, params)) = route else {
        return Some(canonical.to_string());
    };
    match route.locales.get(code) {
        Some(LocalePath::Disabled) => None,
        Some(LocalePath::Custom(custom)) => Some(custom.render(params).unwrap_or_else(|| {
            tracing::warn!(locale = code, path = canonical, "custom path has unfilled parameters");
            canonical.to_string()
        })),
        None => Some(canonical.to_string()),
    }
}

#[derive(Debug, Clone)]
struct LocaleSet {
    locales: Vec<LocaleConfig>,
    codes: Vec<String>,
    default_index: usize,
    strategy: I18nStrategy,
    auto_transform: bool,
    domains: bool,
    pages: PageMap,
}

impl LocaleSet {
    fn build(config: &I18nConfig) -> Self {
        let default_index = config
            .locales
            .iter()
            .position(|l| l.code == config.default_locale)
            .unwrap_or(0);
        Self {
            codes: config.locales.iter().map(|l| l.code.clone()).collect(),
            locales: config.locales.clone(),
            default_index,
            strategy: config.strategy,
            auto_transform: config.auto_transform,
            domains: config.uses_domains(),
            pages: PageMap::build(config),
        }
    }

    fn default_locale(&self) -> &LocaleConfig {
        &self.locales[self.default_index]
    }

    fn find(&self, code: &str) -> Option<&LocaleConfig> {
        self.locales.iter().find(|l| l.code == code)
    }

    fn prefixes_paths(&self) -> bool {
        self.strategy != I18nStrategy::NoPrefix && !self.domains
    }

    /// Detected locale and the path with its prefix removed.
    fn strip<'a>(&'a self, pathname: &str) -> (&'a LocaleConfig, String) {
        if self.prefixes_paths() {
            if let Some((code, rest)) = split_locale_prefix(pathname, &self.codes) {
                if let Some(locale) = self.find(code) {
                    return (locale, rest);
                }
            }
        }
        (self.default_locale(), pathname.to_string())
    }

    fn is_prefixed(&self, index: usize) -> bool {
        if self.domains {
            return false;
        }
        match self.strategy {
            I18nStrategy::Prefix => true,
            I18nStrategy::PrefixExceptDefault => index != self.default_index,
            I18nStrategy::NoPrefix => false,
        }
    }
}

fn entry_locale(locale: &LocaleConfig) -> EntryLocale {
    EntryLocale {
        code: locale.code.clone(),
        iso: locale.iso.clone(),
        hreflang: locale.hreflang().to_string(),
    }
}

/// Split a configured domain (`fr.example.com` or `https://fr.example.com`)
/// into scheme and host.
fn domain_origin(domain: &str) -> (String, String) {
    match domain.split_once("://") {
        Some((scheme, host)) => (scheme.to_string(), host.trim_end_matches('/').to_string()),
        None => ("https".to_string(), domain.trim_end_matches('/').to_string()),
    }
}

struct Variant<'a> {
    locale: &'a LocaleConfig,
    loc: String,
    relative: String,
    path: ParsedLoc,
}

/// Expands entries into per-locale variants and assigns dedup keys.
#[derive(Debug)]
pub struct I18nExpander {
    locales: Option<LocaleSet>,
    policy: NormalizePolicy,
    rules: RouteRuleIndex,
    warned_no_prefix: AtomicBool,
}

impl I18nExpander {
    pub fn new(config: &SitemapConfig, policy: NormalizePolicy, rules: RouteRuleIndex) -> Self {
        Self {
            locales: config.i18n.as_ref().map(LocaleSet::build),
            policy,
            rules,
            warned_no_prefix: AtomicBool::new(false),
        }
    }

    /// Locale codes in configured order, empty without i18n.
    pub fn locale_codes(&self) -> &[String] {
        self.locales.as_ref().map(|l| l.codes.as_slice()).unwrap_or_default()
    }

    pub fn default_locale(&self) -> Option<&str> {
        self.locales.as_ref().map(|l| l.default_locale().code.as_str())
    }

    pub fn expand(&self, merged: MergedEntry) -> Vec<Candidate> {
        let MergedEntry { entry, indexable } = merged;

        let Some(set) = &self.locales else {
            let canonical = entry.path.pathname.clone();
            let key = entry.loc.clone();
            return vec![plain(entry, key, canonical, None, indexable)];
        };
        if entry.is_external() {
            let canonical = entry.path.pathname.clone();
            let key = entry.loc.clone();
            return vec![plain(entry, key, canonical, None, indexable)];
        }

        let (detected, rest) = set.strip(&entry.path.pathname);
        let transform = entry.i18n_transform.unwrap_or(set.auto_transform);
        if !transform {
            let key = format!("{}:{}", detected.code, entry.loc);
            let locale = Some(entry_locale(detected));
            return vec![plain(entry, key, rest, locale, indexable)];
        }

        self.expand_family(set, entry, indexable, detected, &rest)
    }

    fn expand_family(
        &self,
        set: &LocaleSet,
        entry: NormalizedEntry,
        indexable: bool,
        detected: &LocaleConfig,
        rest: &str,
    ) -> Vec<Candidate> {
        let had_slash = rest.len() > 1 && rest.ends_with('/');
        let lookup_path = if had_slash { rest.trim_end_matches('/') } else { rest };
        let route = set.pages.lookup(&detected.code, lookup_path);
        let canonical = route
            .as_ref()
            .and_then(|(r, params)| r.template.render(params))
            .unwrap_or_else(|| lookup_path.to_string());

        let variants: Vec<Variant<'_>> = if set.prefixes_paths() || set.domains {
            set.locales
                .iter()
                .enumerate()
                .filter_map(|(index, locale)| {
                    let path = locale_path(route.as_ref(), &locale.code, &canonical)?;
                    let variant = self.variant(set, index, locale, &path, had_slash, &entry.path);
                    if self.rules.is_indexable(&variant.path.pathname) {
                        Some(variant)
                    } else {
                        tracing::debug!(loc = %variant.loc, "localized path disabled by route rule");
                        None
                    }
                })
                .collect()
        } else {
            self.warn_no_prefix(route.as_ref().is_some_and(|(r, _)| {
                r.locales.iter().any(|(code, path)| {
                    *code != set.default_locale().code && matches!(path, LocalePath::Custom(_))
                })
            }));
            let default = set.default_locale();
            match locale_path(route.as_ref(), &default.code, &canonical) {
                Some(path) => {
                    let variant = self.variant(set, set.default_index, default, &path, had_slash, &entry.path);
                    let entry = ResolvedEntry {
                        key: format!("{}:{}", default.code, variant.relative),
                        loc: variant.loc,
                        path: variant.path,
                        canonical_path: self.keep_slash(&canonical, had_slash),
                        meta: entry.meta,
                        alternates: Vec::new(),
                        locale: Some(entry_locale(default)),
                        sitemap: entry.sitemap,
                    };
                    return vec![Candidate { entry, indexable }];
                }
                None => return Vec::new(),
            }
        };

        let mut alternates = Vec::with_capacity(variants.len() + 1);
        let default_code = &set.default_locale().code;
        if let Some(default) = variants.iter().find(|v| &v.locale.code == default_code) {
            alternates.push(Alternate::new(X_DEFAULT, default.loc.clone()));
        }
        alternates.extend(
            variants
                .iter()
                .map(|v| Alternate::new(v.locale.hreflang(), v.loc.clone())),
        );

        let canonical_path = self.keep_slash(&canonical, had_slash);
        variants
            .into_iter()
            .map(|variant| Candidate {
                entry: ResolvedEntry {
                    key: format!("{}:{}", variant.locale.code, variant.relative),
                    loc: variant.loc,
                    path: variant.path,
                    canonical_path: canonical_path.clone(),
                    meta: entry.meta.clone(),
                    alternates: alternates.clone(),
                    locale: Some(entry_locale(variant.locale)),
                    sitemap: entry.sitemap.clone(),
                },
                indexable,
            })
            .collect()
    }

    fn variant<'a>(
        &self,
        set: &LocaleSet,
        index: usize,
        locale: &'a LocaleConfig,
        path: &str,
        had_slash: bool,
        original: &ParsedLoc,
    ) -> Variant<'a> {
        let localized = if !set.is_prefixed(index) {
            path.to_string()
        } else if path == "/" {
            format!("/{}", locale.code)
        } else {
            format!("/{}{}", locale.code, path)
        };
        let pathname = self.keep_slash(&localized, had_slash);
        let relative = format!("{}{}{}", pathname, original.search, original.hash);

        let domain = locale.domain.as_deref().filter(|_| set.domains);
        match domain {
            Some(domain) => {
                let (scheme, host) = domain_origin(domain);
                Variant {
                    locale,
                    loc: format!("{scheme}://{host}{}{relative}", self.policy.base_path),
                    relative,
                    path: ParsedLoc {
                        scheme,
                        host,
                        pathname,
                        search: original.search.clone(),
                        hash: original.hash.clone(),
                    },
                }
            }
            None => Variant {
                locale,
                loc: relative.clone(),
                relative,
                path: ParsedLoc {
                    pathname,
                    search: original.search.clone(),
                    hash: original.hash.clone(),
                    ..Default::default()
                },
            },
        }
    }

    /// Apply the trailing-slash policy, preserving the input's slash when the
    /// policy is to preserve.
    fn keep_slash(&self, path: &str, had_slash: bool) -> String {
        if self.policy.trailing_slash.is_none() && had_slash && !path.ends_with('/') {
            return format!("{path}/");
        }
        self.policy.apply_trailing_slash(path)
    }

    fn warn_no_prefix(&self, custom_paths: bool) {
        if custom_paths {
            let err = SitemapError::UnsupportedStrategy(
                "custom page paths are ignored under no_prefix without locale domains".to_string(),
            );
            tracing::warn!("{}", err);
        }
        if !self.warned_no_prefix.swap(true, Ordering::Relaxed) {
            let err = SitemapError::UnsupportedStrategy(
                "no_prefix without locale domains: emitting default-locale entries without alternates".to_string(),
            );
            tracing::warn!("{}", err);
        }
    }
}

fn plain(
    entry: NormalizedEntry,
    key: String,
    canonical_path: String,
    locale: Option<EntryLocale>,
    indexable: bool,
) -> Candidate {
    Candidate {
        entry: ResolvedEntry {
            loc: entry.loc,
            key,
            path: entry.path,
            canonical_path,
            meta: entry.meta,
            alternates: entry.alternatives.unwrap_or_default(),
            locale,
            sitemap: entry.sitemap,
        },
        indexable,
    }
}
