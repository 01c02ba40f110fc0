use anyhow::Context;
use core_smap::{SitemapEngine, config_path, get_api_base_url, setup_logging};
use data_model_smap::config::SitemapConfig;

use api_smap::{AppState, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    setup_logging("api_smap=debug,core_smap=debug,tower_http=debug");

    let path = config_path();
    let config =
        SitemapConfig::from_file(&path).with_context(|| format!("Cannot load sitemap config {}", path.display()))?;
    let engine = SitemapEngine::new(config)?;
    let app = routes::router().with_state(AppState::new(engine));

    let addr = get_api_base_url().context("Invalid HOST or PORT")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;
    tracing::info!(%addr, config = %path.display(), "serving sitemaps");
    axum::serve(listener, app).await?;
    Ok(())
}
