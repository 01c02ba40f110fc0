use axum::{
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri,
        header::{AsHeaderName, CACHE_CONTROL, CONTENT_TYPE, HOST, VARY},
    },
    response::{IntoResponse, Response},
};
use core_smap::SitemapError;
use data_model_smap::config::SitemapConfig;
use data_model_smap::models::SitemapHttpError;

use crate::cache::{CacheStatus, CachedDocument};
use crate::state::AppState;

pub const CACHE_HEADER: &str = "x-sitemap-cache";
pub const GENERATED_HEADER: &str = "x-sitemap-generated";
pub const EXPIRES_HEADER: &str = "x-sitemap-cache-expires";
pub const REMAINING_HEADER: &str = "x-sitemap-cache-remaining";

fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn first_value(value: &str) -> Option<&str> {
    value.split(',').next().map(str::trim).filter(|v| !v.is_empty())
}

/// `scheme://host` of the request as the client saw it, honouring
/// `X-Forwarded-Proto` / `X-Forwarded-Host`. The scheme defaults to `http`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = header_str(headers, "x-forwarded-host")
        .and_then(first_value)
        .or_else(|| header_str(headers, HOST).and_then(first_value))?;
    let proto = header_str(headers, "x-forwarded-proto")
        .and_then(first_value)
        .unwrap_or("http");
    Some(format!("{}://{}", proto.to_ascii_lowercase(), host.to_ascii_lowercase()))
}

/// Cache key: effective origin, then each configured vary header, then the path.
pub fn cache_key(origin: Option<&str>, vary_headers: &[String], headers: &HeaderMap, path: &str) -> String {
    let mut key = origin.unwrap_or_default().to_string();
    for name in vary_headers {
        let value = header_str(headers, name.as_str()).unwrap_or_default();
        key.push_str(&format!("|{}={}", name.to_ascii_lowercase(), value));
    }
    key.push('|');
    key.push_str(path);
    key
}

/// Not-found class errors become 404s, everything else a 500.
pub fn http_error(error: SitemapError) -> SitemapHttpError {
    if error.is_not_found() {
        tracing::debug!(error = %error, "sitemap document not found");
        SitemapHttpError::NotFound(error.to_string())
    } else {
        tracing::error!(error = %error, "sitemap generation failed");
        SitemapHttpError::Generation(error.to_string())
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, value, error = %e, "skipping invalid response header"),
    }
}

fn document_response(cached: &CachedDocument, status: CacheStatus, config: &SitemapConfig) -> Response {
    let mut response = (StatusCode::OK, cached.document.body.clone()).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
    insert_header(headers, CACHE_CONTROL, &config.cache.cache_control());
    if !config.cache.vary_headers.is_empty() {
        insert_header(headers, VARY, &config.cache.vary_headers.join(", "));
    }

    if config.debug {
        headers.insert(HeaderName::from_static(CACHE_HEADER), HeaderValue::from_static(status.as_str()));
        insert_header(
            headers,
            HeaderName::from_static(GENERATED_HEADER),
            &cached.generated_at.to_rfc3339(),
        );
        insert_header(
            headers,
            HeaderName::from_static(EXPIRES_HEADER),
            &cached.expires_at.to_rfc3339(),
        );
        insert_header(
            headers,
            HeaderName::from_static(REMAINING_HEADER),
            &cached.remaining_secs().to_string(),
        );
    }
    response
}

/// GET /{sitemap}.xml, /{sitemap}-{n}.xml, /sitemap_index.xml - Serve one sitemap document
pub async fn get_sitemap(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, SitemapHttpError> {
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let path = uri.path().to_string();
    if !path.ends_with(".xml") {
        return Err(SitemapHttpError::NotFound(path));
    }

    let config = state.engine.config();
    let origin = request_origin(&headers);
    let key = cache_key(origin.as_deref(), &config.cache.vary_headers, &headers, &path);

    let engine = state.engine.clone();
    let generate = move || {
        let engine = engine.clone();
        let origin = origin.clone();
        let path = path.clone();
        async move {
            let scope = engine.scope(origin.as_deref())?;
            scope.render(&path).await
        }
    };

    let (cached, status) = state.cache.get_or_generate(&key, generate).await.map_err(http_error)?;
    tracing::debug!(key, cache = status.as_str(), entries = cached.document.entries, "sitemap served");
    Ok(document_response(&cached, status, config))
}
