//! Metadata layering: global defaults, route rules and per-sitemap defaults.

use std::collections::HashMap;

use data_model_smap::config::{OrderedMap, RouteRule};
use data_model_smap::entry::EntryMeta;

use crate::errors::SitemapError;
use crate::resolve::normalize::NormalizedEntry;

/// Route rules indexed for lookup: exact paths in a hash map, wildcard
/// prefixes sorted longest first.
#[derive(Debug, Clone, Default)]
pub struct RouteRuleIndex {
    exact: HashMap<String, RouteRule>,
    prefixes: Vec<(String, RouteRule)>,
}

impl RouteRuleIndex {
    /// Build the index once per configuration load. When two rules have the
    /// same specificity the last declared one wins.
    pub fn build(rules: &OrderedMap<RouteRule>) -> Self {
        let mut exact: HashMap<String, RouteRule> = HashMap::new();
        let mut prefixes: Vec<(String, RouteRule)> = Vec::new();

        for (pattern, rule) in rules.iter() {
            if pattern.ends_with('*') {
                let prefix = pattern.trim_end_matches('*').to_string();
                if let Some(existing) = prefixes.iter_mut().find(|(p, _)| *p == prefix) {
                    log_conflict(pattern);
                    existing.1 = rule.clone();
                } else {
                    prefixes.push((prefix, rule.clone()));
                }
            } else if exact.insert(trim_path(pattern).to_string(), rule.clone()).is_some() {
                log_conflict(pattern);
            }
        }

        // Stable: equal lengths keep declaration order.
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { exact, prefixes }
    }

    /// Exact match first, then the longest matching wildcard prefix.
    pub fn find(&self, pathname: &str) -> Option<&RouteRule> {
        let path = trim_path(pathname);
        if let Some(rule) = self.exact.get(path) {
            return Some(rule);
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, path))
            .map(|(_, rule)| rule)
    }

    /// False when a route rule turns indexing off for this path.
    pub fn is_indexable(&self, pathname: &str) -> bool {
        self.find(pathname).is_none_or(RouteRule::is_indexable)
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}

fn log_conflict(pattern: &str) {
    let conflict = SitemapError::RouteRuleConflict {
        pattern: pattern.to_string(),
    };
    tracing::warn!("{}", conflict);
}

/// Trailing slashes are not significant for rule matching.
fn trim_path(pathname: &str) -> &str {
    let trimmed = pathname.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// `/blog/` matches `/blog` and everything below it; `/blog` matches any
/// path that starts with it.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if let Some(base) = prefix.strip_suffix('/') {
        path.starts_with(prefix) || path == trim_path(base)
    } else {
        path.starts_with(prefix)
    }
}

/// An entry with its layered metadata and route-rule verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntry {
    pub entry: NormalizedEntry,
    /// False when a route rule vetoed the entry. The filter stage drops it.
    pub indexable: bool,
}

/// Layers global defaults, the matching route rule and the sitemap's own
/// defaults (later tiers win field by field), then lets the entry's explicit
/// metadata win over the combined defaults.
#[derive(Debug, Clone, Default)]
pub struct DefaultsMerger {
    global: EntryMeta,
    rules: RouteRuleIndex,
    /// Locale codes stripped from a path when the exact path has no rule.
    locale_prefixes: Vec<String>,
}

impl DefaultsMerger {
    pub fn new(global: EntryMeta, rules: RouteRuleIndex) -> Self {
        Self {
            global,
            rules,
            locale_prefixes: Vec::new(),
        }
    }

    pub fn with_locale_prefixes(mut self, codes: Vec<String>) -> Self {
        self.locale_prefixes = codes;
        self
    }

    pub fn rules(&self) -> &RouteRuleIndex {
        &self.rules
    }

    /// The route rule for a relative path, falling back to the path with its
    /// locale prefix removed.
    pub fn rule_for(&self, pathname: &str) -> Option<&RouteRule> {
        self.rules.find(pathname).or_else(|| {
            let (_, rest) = split_locale_prefix(pathname, &self.locale_prefixes)?;
            self.rules.find(&rest)
        })
    }

    /// Route-rule verdict for a root-relative href such as an alternate link.
    /// Query and fragment are ignored and locale prefixes fall back the same
    /// way as [`Self::rule_for`].
    pub fn is_indexable(&self, href: &str) -> bool {
        let end = href.find(['?', '#']).unwrap_or(href.len());
        self.rule_for(&href[..end]).is_none_or(RouteRule::is_indexable)
    }

    pub fn merge(&self, mut entry: NormalizedEntry, sitemap_defaults: &EntryMeta) -> MergedEntry {
        let rule = if entry.is_external() {
            None
        } else {
            self.rule_for(&entry.path.pathname)
        };

        let mut layered = self.global.clone();
        if let Some(meta) = rule.and_then(RouteRule::meta) {
            layered.overlay(meta);
        }
        layered.overlay(sitemap_defaults);
        layered.overlay(&entry.meta);
        entry.meta = layered;

        let indexable = rule.is_none_or(RouteRule::is_indexable);
        if !indexable {
            tracing::debug!(loc = %entry.loc, "route rule disables indexing");
        }
        MergedEntry { entry, indexable }
    }
}

/// Split `/fr/about` into `("fr", "/about")` when the first segment is exactly
/// one of `codes`. Matching is on the whole segment, so `en` never matches
/// `/en-US/...`.
pub fn split_locale_prefix<'a>(pathname: &str, codes: &'a [String]) -> Option<(&'a str, String)> {
    let without_root = pathname.strip_prefix('/')?;
    let (first, rest) = match without_root.find('/') {
        Some(i) => (&without_root[..i], &without_root[i..]),
        None => (without_root, ""),
    };
    let code = codes.iter().find(|code| code.as_str() == first)?;
    let rest = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
    Some((code.as_str(), rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::normalize::{NormalizePolicy, normalize_entry};
    use data_model_smap::config::SitemapRule;
    use data_model_smap::entry::{ChangeFreq, EntryInput, RawEntry};

    fn rules(json: &str) -> RouteRuleIndex {
        let map: OrderedMap<RouteRule> = serde_json::from_str(json).unwrap();
        RouteRuleIndex::build(&map)
    }

    fn normalized(raw: RawEntry) -> NormalizedEntry {
        normalize_entry(raw, &NormalizePolicy::default()).unwrap()
    }

    #[test]
    fn test_href_verdict_ignores_query_and_locale() {
        let merger = DefaultsMerger::new(EntryMeta::default(), rules(r#"{"/hidden": {"robots": false}}"#))
            .with_locale_prefixes(vec!["en".to_string(), "fr".to_string()]);
        assert!(!merger.is_indexable("/hidden?ref=nav"));
        assert!(!merger.is_indexable("/hidden#top"));
        assert!(!merger.is_indexable("/fr/hidden?x=1#y"));
        assert!(merger.is_indexable("/de/hidden"));
        assert!(merger.is_indexable("/visible?hidden"));
    }

    #[test]
    fn test_exact_beats_wildcard() {
        let index = rules(
            r#"{"/blog/**": {"sitemap": {"priority": 0.1}}, "/blog/featured": {"sitemap": {"priority": 0.9}}}"#,
        );
        let featured = index.find("/blog/featured").and_then(RouteRule::meta).unwrap();
        assert_eq!(featured.priority, Some(0.9));
        let other = index.find("/blog/other").and_then(RouteRule::meta).unwrap();
        assert_eq!(other.priority, Some(0.1));
        assert!(index.find("/blog").is_some());
        assert!(index.find("/blogger").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let index = rules(
            r#"{"/docs/**": {"sitemap": {"priority": 0.2}}, "/docs/api/**": {"sitemap": {"priority": 0.4}}}"#,
        );
        let meta = index.find("/docs/api/v1").and_then(RouteRule::meta).unwrap();
        assert_eq!(meta.priority, Some(0.4));
        let meta = index.find("/docs/guide").and_then(RouteRule::meta).unwrap();
        assert_eq!(meta.priority, Some(0.2));
    }

    #[test]
    fn test_equal_specificity_last_declared_wins() {
        let index = rules(
            r#"{"/blog/**": {"sitemap": {"priority": 0.1}}, "/blog/*": {"sitemap": {"priority": 0.7}}}"#,
        );
        let meta = index.find("/blog/x").and_then(RouteRule::meta).unwrap();
        assert_eq!(meta.priority, Some(0.7));
    }

    #[test]
    fn test_trailing_slash_insensitive() {
        let index = rules(r#"{"/hidden": {"robots": false}}"#);
        assert!(!index.is_indexable("/hidden/"));
        assert!(!index.is_indexable("/hidden"));
        assert!(index.is_indexable("/visible"));
    }

    #[test]
    fn test_tier_order() {
        let global = EntryMeta {
            changefreq: Some(ChangeFreq::Monthly),
            priority: Some(0.5),
            lastmod: Some("2020-01-01".to_string()),
            ..Default::default()
        };
        let merger = DefaultsMerger::new(
            global,
            rules(r#"{"/blog/**": {"sitemap": {"changefreq": "daily", "priority": 0.6}}}"#),
        );
        let sitemap_defaults = EntryMeta {
            priority: Some(0.8),
            ..Default::default()
        };

        let raw = RawEntry::FullEntry(EntryInput::new("/blog/a").with_meta(EntryMeta {
            lastmod: Some("2024-05-05".to_string()),
            ..Default::default()
        }));
        let merged = merger.merge(normalized(raw), &sitemap_defaults);

        assert!(merged.indexable);
        assert_eq!(merged.entry.meta.changefreq, Some(ChangeFreq::Daily));
        assert_eq!(merged.entry.meta.priority, Some(0.8));
        assert_eq!(merged.entry.meta.lastmod.as_deref(), Some("2024-05-05"));
    }

    #[test]
    fn test_veto_is_flagged_not_dropped() {
        let merger = DefaultsMerger::new(EntryMeta::default(), rules(r#"{"/hidden": {"robots": false}}"#));
        let merged = merger.merge(normalized("/hidden".into()), &EntryMeta::default());
        assert!(!merged.indexable);
        assert_eq!(merged.entry.loc, "/hidden");
    }

    #[test]
    fn test_sitemap_false_rule_vetoes() {
        let rule = RouteRule {
            sitemap: Some(SitemapRule::Toggle(false)),
            ..Default::default()
        };
        assert!(!rule.is_indexable());
    }

    #[test]
    fn test_locale_prefixed_path_uses_unprefixed_rule() {
        let merger = DefaultsMerger::new(EntryMeta::default(), rules(r#"{"/hidden": {"robots": false}}"#))
            .with_locale_prefixes(vec!["en".to_string(), "fr".to_string()]);
        let merged = merger.merge(normalized("/fr/hidden".into()), &EntryMeta::default());
        assert!(!merged.indexable);
    }

    #[test]
    fn test_split_locale_prefix_full_segment_only() {
        let codes = vec!["en".to_string(), "en-US".to_string()];
        assert_eq!(split_locale_prefix("/en-US/about", &codes), Some(("en-US", "/about".to_string())));
        assert_eq!(split_locale_prefix("/en/about", &codes), Some(("en", "/about".to_string())));
        assert_eq!(split_locale_prefix("/en", &codes), Some(("en", "/".to_string())));
        assert_eq!(split_locale_prefix("/english/about", &codes), None);
    }
}
