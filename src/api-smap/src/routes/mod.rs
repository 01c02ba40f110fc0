use axum::{Router, middleware, routing::get};
use core_smap::health_check;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod debug;
pub mod logging_middleware;
pub mod sitemap;

/// Path of the debug report, served only when `debug` is enabled.
pub const DEBUG_PATH: &str = "/__sitemap__/debug.json";

//
// Router
//

/// Sitemap document paths depend on the configuration (names, chunks,
/// locales, path prefix), so they are served from the fallback handler.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route(DEBUG_PATH, get(debug::get_debug))
        .fallback(sitemap::get_sitemap)
        // Custom route access logging
        .layer(middleware::from_fn(logging_middleware::log_route_access))
        // Tracing middleware
        .layer(TraceLayer::new_for_http())
}
