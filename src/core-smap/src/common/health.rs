use axum::http::StatusCode;

/// Liveness check. Does not touch any sitemap source.
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "healthy")
}
