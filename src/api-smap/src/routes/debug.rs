use axum::{
    extract::{Json, State},
    http::HeaderMap,
};
use data_model_smap::models::{DebugResponse, SitemapHttpError};

use crate::routes::DEBUG_PATH;
use crate::routes::sitemap::{http_error, request_origin};
use crate::state::AppState;

/// GET /__sitemap__/debug.json - Document layout, entry counts and source reports
///
/// Runs a fresh resolution, bypassing the document cache.
pub async fn get_debug(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DebugResponse>, SitemapHttpError> {
    if !state.engine.config().debug {
        return Err(SitemapHttpError::NotFound(DEBUG_PATH.to_string()));
    }
    let origin = request_origin(&headers);
    let scope = state.engine.scope(origin.as_deref()).map_err(http_error)?;
    let report = scope.debug_report().await.map_err(http_error)?;
    tracing::debug!(documents = report.documents.len(), sources = report.sources.len(), "debug report");
    Ok(Json(report))
}
