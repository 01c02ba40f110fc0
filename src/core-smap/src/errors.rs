//! Error types for sitemap resolution and rendering.

use thiserror::Error;

/// Main error type for sitemap operations.
///
/// Most variants are recoverable: the pipeline logs them and carries on.
/// Only [`SitemapError::RequiredSource`] and configuration errors stop a
/// document from being produced.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// A source could not be fetched or decoded
    #[error("Source '{source_id}' failed: {reason}")]
    SourceFetch { source_id: String, reason: String },

    /// A raw entry could not be parsed
    #[error("Malformed entry '{loc}': {reason}")]
    MalformedEntry { loc: String, reason: String },

    /// Two route rules match with equal specificity
    #[error("Route rules conflict on '{pattern}'; the last declared rule wins")]
    RouteRuleConflict { pattern: String },

    /// Chunk index out of range, or a chunk of an unchunked sitemap
    #[error("Sitemap '{sitemap}' has no chunk {index}")]
    ChunkNotFound { sitemap: String, index: String },

    /// No document with this name
    #[error("Unknown sitemap: {0}")]
    UnknownSitemap(String),

    /// i18n strategy misconfiguration, handled best-effort
    #[error("Unsupported i18n strategy usage: {0}")]
    UnsupportedStrategy(String),

    /// A required source failed, no valid document can be produced
    #[error("Required source '{source_id}' failed: {reason}")]
    RequiredSource { source_id: String, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// JSON decoding failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML sitemap parsing failed
    #[error("Sitemap parsing failed: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// Glob pattern error
    #[error("Glob pattern error: {0}")]
    GlobError(#[from] globset::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SitemapError {
    /// True for errors that mean "no such document" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChunkNotFound { .. } | Self::UnknownSitemap(_))
    }
}

impl From<data_model_smap::config::ConfigError> for SitemapError {
    fn from(err: data_model_smap::config::ConfigError) -> Self {
        SitemapError::InvalidConfig(err.to_string())
    }
}

/// Type alias for Result with SitemapError
pub type Result<T> = std::result::Result<T, SitemapError>;
