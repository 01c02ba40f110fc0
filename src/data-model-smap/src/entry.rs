//! Sitemap entries at both ends of the resolution pipeline: the untyped
//! [`RawEntry`] a source hands us and the canonical [`ResolvedEntry`] that is
//! rendered into a document.

use serde::{Deserialize, Serialize};

/// How frequently a page is likely to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFreq {
    /// The protocol spelling of the value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl std::fmt::Display for ChangeFreq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<image:image>` extension block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageEntry {
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "geoLocation")]
    pub geo_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// `<video:video>` extension block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoEntry {
    pub title: String,
    #[serde(alias = "thumbnailLoc")]
    pub thumbnail_loc: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "contentLoc")]
    pub content_loc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "playerLoc")]
    pub player_loc: Option<String>,
    /// Duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "publicationDate")]
    pub publication_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "familyFriendly")]
    pub family_friendly: Option<bool>,
}

/// Publisher of a `<news:news>` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewsPublication {
    pub name: String,
    pub language: String,
}

/// `<news:news>` extension block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewsEntry {
    pub publication: NewsPublication,
    #[serde(alias = "publicationDate")]
    pub publication_date: String,
    pub title: String,
}

/// The overlayable metadata of an entry.
///
/// Every field is optional so that a tier (global defaults, a route rule, a
/// sitemap's defaults, or the entry itself) only speaks for what it sets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changefreq: Option<ChangeFreq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<VideoEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<NewsEntry>,
}

impl EntryMeta {
    /// Shallow field-by-field merge: every field `later` sets replaces ours.
    /// Arrays are replaced wholesale, never concatenated.
    pub fn overlay(&mut self, later: &EntryMeta) {
        if later.lastmod.is_some() {
            self.lastmod.clone_from(&later.lastmod);
        }
        if later.changefreq.is_some() {
            self.changefreq = later.changefreq;
        }
        if later.priority.is_some() {
            self.priority = later.priority;
        }
        if later.images.is_some() {
            self.images.clone_from(&later.images);
        }
        if later.videos.is_some() {
            self.videos.clone_from(&later.videos);
        }
        if later.news.is_some() {
            self.news.clone_from(&later.news);
        }
    }

    /// Consuming form of [`EntryMeta::overlay`].
    pub fn overlaid(mut self, later: &EntryMeta) -> Self {
        self.overlay(later);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == EntryMeta::default()
    }
}

/// One `<xhtml:link rel="alternate">` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alternate {
    pub hreflang: String,
    pub href: String,
}

impl Alternate {
    pub fn new(hreflang: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            hreflang: hreflang.into(),
            href: href.into(),
        }
    }
}

/// An entry exactly as a source produced it: a bare location string or an
/// object carrying a location plus metadata and private control flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    BareLoc(String),
    FullEntry(EntryInput),
}

impl RawEntry {
    pub fn loc(&self) -> &str {
        match self {
            Self::BareLoc(loc) => loc,
            Self::FullEntry(input) => &input.loc,
        }
    }

    /// Promote a bare location into the object form.
    pub fn into_input(self) -> EntryInput {
        match self {
            Self::BareLoc(loc) => EntryInput::new(loc),
            Self::FullEntry(input) => input,
        }
    }
}

impl From<&str> for RawEntry {
    fn from(loc: &str) -> Self {
        Self::BareLoc(loc.to_string())
    }
}

impl From<String> for RawEntry {
    fn from(loc: String) -> Self {
        Self::BareLoc(loc)
    }
}

impl From<EntryInput> for RawEntry {
    fn from(input: EntryInput) -> Self {
        Self::FullEntry(input)
    }
}

/// Object form of a [`RawEntry`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryInput {
    #[serde(alias = "url")]
    pub loc: String,
    #[serde(flatten)]
    pub meta: EntryMeta,
    /// The location is already percent-encoded and must be emitted verbatim.
    #[serde(default, rename = "_encoded", skip_serializing_if = "std::ops::Not::not")]
    pub encoded: bool,
    /// Expand this entry into one entry per configured locale.
    #[serde(default, rename = "_i18nTransform", skip_serializing_if = "Option::is_none")]
    pub i18n_transform: Option<bool>,
    /// Pin the entry to one named sitemap.
    #[serde(default, rename = "_sitemap", skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<String>,
    /// Explicit alternates supplied by the source.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "alternates")]
    pub alternatives: Option<Vec<Alternate>>,
}

impl EntryInput {
    pub fn new(loc: impl Into<String>) -> Self {
        Self {
            loc: loc.into(),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: EntryMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_i18n_transform(mut self, enabled: bool) -> Self {
        self.i18n_transform = Some(enabled);
        self
    }

    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }
}

/// Decomposed location. `scheme` and `host` are empty for relative locations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedLoc {
    pub scheme: String,
    pub host: String,
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub search: String,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
}

impl ParsedLoc {
    pub fn is_absolute(&self) -> bool {
        !self.host.is_empty()
    }

    /// `pathname + search + hash`.
    pub fn relative(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// Locale an entry was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLocale {
    pub code: String,
    pub iso: Option<String>,
    pub hreflang: String,
}

/// The canonical output record of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// The location actually emitted: root-relative, or absolute for external
    /// links and locale domains.
    pub loc: String,
    /// Deduplication identity.
    pub key: String,
    pub path: ParsedLoc,
    /// Pathname with any locale prefix removed. Filters are matched against it.
    pub canonical_path: String,
    pub meta: EntryMeta,
    /// `x-default` first when present, then configured locale order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<Alternate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<EntryLocale>,
    /// Named sitemap the entry is pinned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<String>,
}

impl ResolvedEntry {
    pub fn is_external(&self) -> bool {
        self.path.is_absolute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_entry_bare_and_full() {
        let entries: Vec<RawEntry> = serde_json::from_str(
            r#"["/foo", {"loc": "/bar", "priority": 0.5, "changefreq": "daily", "_i18nTransform": true}]"#,
        )
        .unwrap();

        assert_eq!(entries[0], RawEntry::BareLoc("/foo".to_string()));
        match &entries[1] {
            RawEntry::FullEntry(input) => {
                assert_eq!(input.loc, "/bar");
                assert_eq!(input.meta.priority, Some(0.5));
                assert_eq!(input.meta.changefreq, Some(ChangeFreq::Daily));
                assert_eq!(input.i18n_transform, Some(true));
                assert!(!input.encoded);
            }
            other => panic!("expected full entry, got {other:?}"),
        }
    }

    #[test]
    fn test_overlay_replaces_set_fields_only() {
        let mut base = EntryMeta {
            changefreq: Some(ChangeFreq::Weekly),
            priority: Some(0.3),
            images: Some(vec![ImageEntry {
                loc: "/a.png".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let later = EntryMeta {
            priority: Some(0.9),
            ..Default::default()
        };
        base.overlay(&later);

        assert_eq!(base.changefreq, Some(ChangeFreq::Weekly));
        assert_eq!(base.priority, Some(0.9));
        assert_eq!(base.images.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_overlay_never_concatenates_arrays() {
        let image = |loc: &str| ImageEntry {
            loc: loc.to_string(),
            ..Default::default()
        };
        let base = EntryMeta {
            images: Some(vec![image("/a.png"), image("/b.png")]),
            ..Default::default()
        };
        let merged = base.overlaid(&EntryMeta {
            images: Some(vec![image("/c.png")]),
            ..Default::default()
        });
        assert_eq!(merged.images, Some(vec![image("/c.png")]));
    }

    #[test]
    fn test_parsed_loc_relative() {
        let parsed = ParsedLoc {
            pathname: "/a".to_string(),
            search: "?x=1".to_string(),
            hash: "#top".to_string(),
            ..Default::default()
        };
        assert!(!parsed.is_absolute());
        assert_eq!(parsed.relative(), "/a?x=1#top");
    }
}
