use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::routes::sitemap::CACHE_HEADER;

/// Middleware that logs each route access with its result and, for sitemap
/// documents served in debug mode, the cache outcome.
pub async fn log_route_access(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    // Call the actual route handler
    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();
    let cache = response
        .headers()
        .get(CACHE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    match status {
        400..=499 => tracing::warn!(%method, %path, status, duration_ms, %cache),
        500..=599 => tracing::error!(%method, %path, status, duration_ms, %cache),
        _ => tracing::info!(%method, %path, status, duration_ms, %cache),
    }

    response
}
