//! Configuration model for the sitemap engine, loaded from a JSON file at
//! process start and immutable afterwards.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::entry::{EntryMeta, RawEntry};

/// Default chunk size used by sitemaps that enable `chunks` without a size.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Name of the index document.
pub const INDEX_NAME: &str = "sitemap_index";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid site_url: {0}")]
    SiteUrl(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// JSON-object map that keeps declaration order. Route rules and page maps
/// resolve ties by declaration order, which a hash map would lose.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            entries.push((k, v));
        }
        Ok(OrderedMap(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Where entries come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDescriptor {
    /// Fetch reference without options.
    Fetch(String),
    /// Literal entries.
    Literal(Vec<RawEntry>),
    /// Fetch reference with request options.
    Request(FetchSource),
}

impl SourceDescriptor {
    /// The fetchable form of this descriptor, if it is fetchable at all.
    pub fn as_request(&self) -> Option<Cow<'_, FetchSource>> {
        match self {
            Self::Fetch(fetch) => Some(Cow::Owned(FetchSource::new(fetch.clone()))),
            Self::Request(source) => Some(Cow::Borrowed(source)),
            Self::Literal(_) => None,
        }
    }

    /// Canonical identity: URL plus options. `"/x"` and `{"fetch": "/x"}` are
    /// the same source.
    pub fn identity(&self) -> String {
        let serialized = match self.as_request() {
            Some(request) => serde_json::to_string(request.as_ref()),
            None => serde_json::to_string(self),
        };
        serialized.unwrap_or_else(|_| format!("{self:?}"))
    }

    /// Short human-readable label for logs and debug output.
    pub fn label(&self) -> String {
        match self {
            Self::Fetch(fetch) => fetch.clone(),
            Self::Request(source) => source.fetch.clone(),
            Self::Literal(entries) => format!("<{} literal entries>", entries.len()),
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::Request(source) if source.required)
    }
}

/// A fetchable source reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchSource {
    /// Absolute `http(s)` URL, root-relative path or `file://` path.
    pub fetch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// A failure of this source fails the whole document.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paginate: Option<Pagination>,
}

impl FetchSource {
    pub fn new(fetch: impl Into<String>) -> Self {
        Self {
            fetch: fetch.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_pages() -> usize {
    100
}

/// An include/exclude rule: a glob (`*` within a segment, `**` across
/// segments) or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterPattern {
    Glob(String),
    Regex { regex: String },
}

/// `sitemap` field of a route rule: `false` removes the route, an object
/// overlays metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SitemapRule {
    Toggle(bool),
    Meta(EntryMeta),
}

/// Per-route overrides, keyed by exact path or wildcard prefix (`/blog/**`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<SitemapRule>,
}

impl RouteRule {
    /// False when any of the rule's indexability switches is off.
    pub fn is_indexable(&self) -> bool {
        self.robots != Some(false)
            && self.index != Some(false)
            && self.sitemap != Some(SitemapRule::Toggle(false))
    }

    pub fn meta(&self) -> Option<&EntryMeta> {
        match &self.sitemap {
            Some(SitemapRule::Meta(meta)) => Some(meta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum I18nStrategy {
    Prefix,
    #[default]
    PrefixExceptDefault,
    NoPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleConfig {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
    /// Host serving this locale when locales live on distinct domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl LocaleConfig {
    pub fn hreflang(&self) -> &str {
        self.iso.as_deref().unwrap_or(&self.code)
    }
}

/// Per-locale path of a page: a custom path template, or `false` to disable
/// the page for that locale (`true` keeps the default path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PagePath {
    Enabled(bool),
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I18nConfig {
    pub locales: Vec<LocaleConfig>,
    pub default_locale: String,
    #[serde(default)]
    pub strategy: I18nStrategy,
    /// Expand every relative entry unless it opts out with `_i18nTransform: false`.
    #[serde(default)]
    pub auto_transform: bool,
    /// Route template (default-locale form, `[param]` for dynamic segments)
    /// to per-locale paths.
    #[serde(default)]
    pub pages: OrderedMap<BTreeMap<String, PagePath>>,
}

impl I18nConfig {
    pub fn default_locale(&self) -> Option<&LocaleConfig> {
        self.locales.iter().find(|l| l.code == self.default_locale)
    }

    pub fn uses_domains(&self) -> bool {
        !self.locales.is_empty() && self.locales.iter().all(|l| l.domain.is_some())
    }
}

/// Response caching and `Cache-Control` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Freshness window of a cached document. `0` disables caching.
    pub ttl_secs: u64,
    /// Serve stale documents while regenerating in the background.
    pub swr: bool,
    pub max_age: u64,
    pub s_maxage: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    /// Request headers that vary the cache key (in addition to the host).
    pub vary_headers: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            swr: true,
            max_age: 600,
            s_maxage: None,
            stale_while_revalidate: None,
            vary_headers: Vec::new(),
        }
    }
}

impl CacheSettings {
    /// `Cache-Control` header value.
    pub fn cache_control(&self) -> String {
        let mut value = format!("public, max-age={}", self.max_age);
        if let Some(s_maxage) = self.s_maxage {
            value.push_str(&format!(", s-maxage={s_maxage}"));
        }
        if let Some(swr) = self.stale_while_revalidate {
            value.push_str(&format!(", stale-while-revalidate={swr}"));
        }
        value
    }
}

/// Externally hosted sitemap listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReference {
    pub sitemap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
}

/// One named sitemap.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapDefinition {
    pub name: String,
    pub sources: Vec<SourceDescriptor>,
    pub urls: Vec<RawEntry>,
    pub include: Vec<FilterPattern>,
    pub exclude: Vec<FilterPattern>,
    pub defaults: EntryMeta,
    #[serde(alias = "chunkSize")]
    pub chunk_size: Option<usize>,
    /// Chunk with the global default chunk size.
    pub chunks: bool,
    /// Also pull the app's own routes and the global sources/urls.
    #[serde(alias = "includeAppSources")]
    pub include_app_sources: bool,
}

impl SitemapDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `None` means unchunked. A zero size disables chunking.
    pub fn effective_chunk_size(&self, default_chunk_size: usize) -> Option<usize> {
        match self.chunk_size {
            Some(0) => None,
            Some(size) => Some(size),
            None if self.chunks && default_chunk_size > 0 => Some(default_chunk_size),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitemapConfig {
    /// Canonical origin used for absolute locations. When absent the request's
    /// scheme and host are used.
    pub site_url: Option<String>,
    /// Path the app is mounted under; stripped from inputs, re-added on output.
    pub base_url: String,
    /// `None` preserves, `Some(true)` forces one trailing slash, `Some(false)` removes it.
    pub trailing_slash: Option<bool>,
    /// File name of the default document.
    pub sitemap_name: String,
    /// Path prefix of named sitemap documents.
    pub sitemaps_path_prefix: String,
    pub defaults: EntryMeta,
    pub route_rules: OrderedMap<RouteRule>,
    pub urls: Vec<RawEntry>,
    pub sources: Vec<SourceDescriptor>,
    /// Static routes supplied by the host application.
    pub app_sources: Vec<SourceDescriptor>,
    pub include: Vec<FilterPattern>,
    pub exclude: Vec<FilterPattern>,
    /// Internal path prefixes excluded unless explicitly included.
    pub internal_prefixes: Vec<String>,
    /// Named sitemaps, in declaration order. Empty means single-sitemap mode.
    pub sitemaps: Vec<SitemapDefinition>,
    pub default_chunk_size: usize,
    /// Extra absolute sitemap URLs listed in the index.
    pub append_sitemaps: Vec<IndexReference>,
    pub i18n: Option<I18nConfig>,
    pub cache: CacheSettings,
    pub debug: bool,
    /// Stylesheet referenced by an `xml-stylesheet` processing instruction.
    pub xsl: Option<String>,
    pub sources_concurrency: usize,
    pub source_timeout_ms: Option<u64>,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            site_url: None,
            base_url: "/".to_string(),
            trailing_slash: None,
            sitemap_name: "sitemap.xml".to_string(),
            sitemaps_path_prefix: "/".to_string(),
            defaults: EntryMeta::default(),
            route_rules: OrderedMap::default(),
            urls: Vec::new(),
            sources: Vec::new(),
            app_sources: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            internal_prefixes: vec!["/_".to_string(), "/api/".to_string()],
            sitemaps: Vec::new(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            append_sitemaps: Vec::new(),
            i18n: None,
            cache: CacheSettings::default(),
            debug: false,
            xsl: None,
            sources_concurrency: 8,
            source_timeout_ms: None,
        }
    }
}

impl SitemapConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: SitemapConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// True when named sitemaps are configured and an index is served.
    pub fn is_multi(&self) -> bool {
        !self.sitemaps.is_empty()
    }

    /// File stem of the default document (`sitemap` for `sitemap.xml`).
    pub fn default_stem(&self) -> &str {
        self.sitemap_name
            .strip_suffix(".xml")
            .unwrap_or(&self.sitemap_name)
    }

    /// The sitemaps to serve. Single-sitemap mode yields one implicit
    /// definition carrying the global filters and every app/global source.
    pub fn definitions(&self) -> Cow<'_, [SitemapDefinition]> {
        if self.is_multi() {
            return Cow::Borrowed(&self.sitemaps);
        }
        Cow::Owned(vec![SitemapDefinition {
            name: self.default_stem().to_string(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            include_app_sources: true,
            ..Default::default()
        }])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(site_url) = &self.site_url {
            url::Url::parse(site_url)?;
        }
        if !self.base_url.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with '/': {}",
                self.base_url
            )));
        }

        let mut seen = HashSet::new();
        for definition in &self.sitemaps {
            let name = definition.name.as_str();
            if name.is_empty() || name.contains('/') || name.ends_with(".xml") {
                return Err(ConfigError::Invalid(format!("invalid sitemap name: '{name}'")));
            }
            if name == INDEX_NAME || name == self.default_stem() {
                return Err(ConfigError::Invalid(format!("sitemap name '{name}' is reserved")));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate sitemap name: '{name}'")));
            }
        }

        if let Some(i18n) = &self.i18n {
            if i18n.locales.is_empty() {
                return Err(ConfigError::Invalid("i18n requires at least one locale".to_string()));
            }
            let mut codes = HashSet::new();
            for locale in &i18n.locales {
                if !codes.insert(locale.code.as_str()) {
                    return Err(ConfigError::Invalid(format!("duplicate locale: '{}'", locale.code)));
                }
            }
            if i18n.default_locale().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "default locale '{}' is not a configured locale",
                    i18n.default_locale
                )));
            }
        }
        Ok(())
    }
}
