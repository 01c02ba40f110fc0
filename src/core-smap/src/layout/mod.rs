//! Document layout: which sitemap documents exist and which request path
//! maps to which document.

pub mod chunk;
pub mod index;

use data_model_smap::config::{INDEX_NAME, SitemapConfig};

use crate::errors::{Result, SitemapError};

pub use chunk::ChunkPlan;
pub use index::{build_index, latest_lastmod};

/// One servable sitemap: a named sitemap, or one locale of a locale-split
/// named sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapGroup {
    /// File stem, e.g. `pages` or `fr-pages`.
    pub file_stem: String,
    /// Position of the definition in `SitemapConfig::definitions()`.
    pub definition: usize,
    pub sitemap: String,
    pub locale: Option<String>,
    pub chunk_size: Option<usize>,
}

/// What a request path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentTarget {
    Index,
    Group { group: usize, chunk: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct Layout {
    groups: Vec<SitemapGroup>,
    multi: bool,
    default_path: String,
    index_path: String,
    prefix: String,
}

impl Layout {
    /// Groups follow declaration order, then locale order for locale-split
    /// sitemaps.
    pub fn new(config: &SitemapConfig, locale_codes: &[String]) -> Self {
        let multi = config.is_multi();
        let mut groups = Vec::new();
        for (definition_index, definition) in config.definitions().iter().enumerate() {
            let chunk_size = definition.effective_chunk_size(config.default_chunk_size);
            let split = multi && definition.include_app_sources && !locale_codes.is_empty();
            if split {
                groups.extend(locale_codes.iter().map(|code| SitemapGroup {
                    file_stem: format!("{code}-{}", definition.name),
                    definition: definition_index,
                    sitemap: definition.name.clone(),
                    locale: Some(code.clone()),
                    chunk_size,
                }));
            } else {
                groups.push(SitemapGroup {
                    file_stem: definition.name.clone(),
                    definition: definition_index,
                    sitemap: definition.name.clone(),
                    locale: None,
                    chunk_size,
                });
            }
        }

        let prefix = format!("/{}/", config.sitemaps_path_prefix.trim_matches('/')).replace("//", "/");
        Self {
            groups,
            multi,
            default_path: format!("/{}", config.sitemap_name.trim_start_matches('/')),
            index_path: format!("/{INDEX_NAME}.xml"),
            prefix,
        }
    }

    pub fn groups(&self) -> &[SitemapGroup] {
        &self.groups
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn index_path(&self) -> &str {
        &self.index_path
    }

    pub fn default_path(&self) -> &str {
        &self.default_path
    }

    /// Request path of a group document or one of its chunks.
    pub fn document_path(&self, group: &SitemapGroup, chunk: Option<usize>) -> String {
        if !self.multi {
            return self.default_path.clone();
        }
        match chunk {
            Some(n) => format!("{}{}-{n}.xml", self.prefix, group.file_stem),
            None => format!("{}{}.xml", self.prefix, group.file_stem),
        }
    }

    /// Map a request path to a document. Chunk ranges are checked later,
    /// once the entry count is known.
    ///
    /// # Errors
    ///
    /// [`SitemapError::UnknownSitemap`] for unknown names and
    /// [`SitemapError::ChunkNotFound`] for chunk routes of unchunked
    /// sitemaps or the base route of chunked ones.
    pub fn route(&self, path: &str) -> Result<DocumentTarget> {
        if path == self.default_path {
            return Ok(if self.multi {
                DocumentTarget::Index
            } else {
                DocumentTarget::Group { group: 0, chunk: None }
            });
        }
        let unknown = || SitemapError::UnknownSitemap(path.to_string());
        if !self.multi {
            return Err(unknown());
        }
        if path == self.index_path {
            return Ok(DocumentTarget::Index);
        }

        let stem = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(".xml"))
            .ok_or_else(unknown)?;

        if let Some(index) = self.groups.iter().position(|g| g.file_stem == stem) {
            let group = &self.groups[index];
            if group.chunk_size.is_some() {
                return Err(SitemapError::ChunkNotFound {
                    sitemap: group.file_stem.clone(),
                    index: "(none)".to_string(),
                });
            }
            return Ok(DocumentTarget::Group { group: index, chunk: None });
        }

        let (name, suffix) = stem.rsplit_once('-').ok_or_else(unknown)?;
        let chunk: usize = suffix.parse().map_err(|_| unknown())?;
        let index = self
            .groups
            .iter()
            .position(|g| g.file_stem == name)
            .ok_or_else(unknown)?;
        if self.groups[index].chunk_size.is_none() {
            return Err(SitemapError::ChunkNotFound {
                sitemap: name.to_string(),
                index: suffix.to_string(),
            });
        }
        Ok(DocumentTarget::Group {
            group: index,
            chunk: Some(chunk),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multi() -> SitemapConfig {
        SitemapConfig::from_json_str(
            r#"{"sitemaps": [
                {"name": "pages", "include_app_sources": true},
                {"name": "posts", "chunk_size": 3}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_single_mode_routes() {
        let config = SitemapConfig::default();
        let layout = Layout::new(&config, &[]);
        assert_eq!(layout.route("/sitemap.xml").unwrap(), DocumentTarget::Group { group: 0, chunk: None });
        assert!(layout.route("/sitemap_index.xml").unwrap_err().is_not_found());
        assert_eq!(layout.document_path(&layout.groups()[0], None), "/sitemap.xml");
    }

    #[test]
    fn test_multi_mode_routes() {
        let layout = Layout::new(&multi(), &[]);
        assert_eq!(layout.route("/sitemap.xml").unwrap(), DocumentTarget::Index);
        assert_eq!(layout.route("/sitemap_index.xml").unwrap(), DocumentTarget::Index);
        assert_eq!(layout.route("/pages.xml").unwrap(), DocumentTarget::Group { group: 0, chunk: None });
        assert_eq!(
            layout.route("/posts-2.xml").unwrap(),
            DocumentTarget::Group { group: 1, chunk: Some(2) }
        );
        assert!(matches!(layout.route("/pages-0.xml"), Err(SitemapError::ChunkNotFound { .. })));
        assert!(matches!(layout.route("/posts.xml"), Err(SitemapError::ChunkNotFound { .. })));
        assert!(matches!(layout.route("/nope.xml"), Err(SitemapError::UnknownSitemap(_))));
        assert!(matches!(layout.route("/posts-x.xml"), Err(SitemapError::UnknownSitemap(_))));
    }

    #[test]
    fn test_locale_split_groups() {
        let codes = vec!["en".to_string(), "fr".to_string()];
        let layout = Layout::new(&multi(), &codes);
        let stems: Vec<&str> = layout.groups().iter().map(|g| g.file_stem.as_str()).collect();
        assert_eq!(stems, vec!["en-pages", "fr-pages", "posts"]);
        assert_eq!(layout.route("/fr-pages.xml").unwrap(), DocumentTarget::Group { group: 1, chunk: None });
    }

    #[test]
    fn test_path_prefix() {
        let mut config = multi();
        config.sitemaps_path_prefix = "/__sitemap__".to_string();
        let layout = Layout::new(&config, &[]);
        assert_eq!(layout.document_path(&layout.groups()[1], Some(0)), "/__sitemap__/posts-0.xml");
        assert_eq!(
            layout.route("/__sitemap__/posts-0.xml").unwrap(),
            DocumentTarget::Group { group: 1, chunk: Some(0) }
        );
        assert!(layout.route("/posts-0.xml").is_err());
    }
}
