use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

/// Outcome of fetching one source during a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Human-readable source label (fetch URL or literal summary).
    pub source: String,
    /// Named sitemaps that referenced the source in this run.
    pub sitemaps: Vec<String>,
    pub entries: usize,
    /// Malformed entries dropped while reading the source.
    pub dropped: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// One servable document of the current layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// File name, e.g. `posts-0.xml`.
    pub name: String,
    /// Request path the document is served under.
    pub path: String,
    pub sitemap: String,
    pub locale: Option<String>,
    pub chunk: Option<usize>,
    pub entries: usize,
}

/// Response payload for `GET /__sitemap__/debug.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugResponse {
    pub multi: bool,
    pub documents: Vec<DocumentSummary>,
    pub sources: Vec<SourceReport>,
    pub cache_ttl_secs: u64,
    pub swr: bool,
}

/// Error for the sitemap document endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum SitemapHttpError {
    /// No such document, or a chunk index out of range.
    #[serde(rename = "not_found")]
    NotFound(String),
    /// No valid document could be produced.
    #[serde(rename = "generation_failure")]
    Generation(String),
}

impl std::fmt::Display for SitemapHttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Generation(msg) => write!(f, "Sitemap generation failed: {}", msg),
        }
    }
}

impl IntoResponse for SitemapHttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            SitemapHttpError::NotFound(_) => StatusCode::NOT_FOUND,
            SitemapHttpError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_status() {
        let response = SitemapHttpError::NotFound("posts-4.xml".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = SitemapHttpError::Generation("required source failed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_http_error_json_shape() {
        let json = serde_json::to_value(SitemapHttpError::NotFound("x.xml".to_string())).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["details"], "x.xml");
    }
}
