//! End-to-end resolution against a local source server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{Json, Router, extract::State, routing::get};
use core_smap::SitemapEngine;
use data_model_smap::config::SitemapConfig;
use serde_json::{Value, json};

/// Serves `/api/urls` and counts how often it is hit.
async fn source_server(hits: Arc<AtomicUsize>) -> String {
    async fn urls(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
        hits.fetch_add(1, Ordering::SeqCst);
        Json(json!([
            "/blog/first",
            {"loc": "/blog/second", "lastmod": "2024-05-01", "changefreq": "weekly"},
            "/drafts/secret",
            "/_internal/state",
            {"not": "an entry"}
        ]))
    }

    let app = Router::new().route("/api/urls", get(urls)).with_state(hits);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn engine(config: Value) -> SitemapEngine {
    SitemapEngine::new(SitemapConfig::from_json_str(&config.to_string()).unwrap()).unwrap()
}

#[tokio::test]
async fn test_root_relative_source_is_filtered_and_merged() {
    let hits = Arc::new(AtomicUsize::new(0));
    let origin = source_server(hits.clone()).await;
    let engine = engine(json!({
        "sources": ["/api/urls"],
        "exclude": ["/drafts/**"],
        "defaults": {"changefreq": "daily", "priority": 0.5},
        "route_rules": {"/blog/**": {"sitemap": {"priority": 0.8}}}
    }));

    let scope = engine.scope(Some(origin.as_str())).unwrap();
    let entries = scope.resolve_named("sitemap").await.unwrap();
    let locs: Vec<&str> = entries.iter().map(|e| e.loc.as_str()).collect();
    assert_eq!(locs, vec!["/blog/first", "/blog/second"]);

    assert_eq!(entries[0].meta.priority, Some(0.8));
    assert_eq!(entries[0].meta.changefreq.map(|c| c.as_str()), Some("daily"));
    assert_eq!(entries[1].meta.changefreq.map(|c| c.as_str()), Some("weekly"));

    let reports = scope.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].source, "/api/urls");
    assert_eq!(reports[0].error, None);

    let doc = scope.render("/sitemap.xml").await.unwrap();
    assert!(doc.body.contains(&format!("<loc>{origin}/blog/second</loc>")));
    assert!(doc.body.contains("<lastmod>2024-05-01</lastmod>"));
}

#[tokio::test]
async fn test_shared_source_is_fetched_once_per_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let origin = source_server(hits.clone()).await;
    let engine = engine(json!({
        "sitemaps": [
            {"name": "blog", "sources": ["/api/urls"], "include": ["/blog/**"]},
            {"name": "everything", "sources": [{"fetch": "/api/urls"}]}
        ]
    }));

    {
        let scope = engine.scope(Some(origin.as_str())).unwrap();
        let documents = scope.render_all().await.unwrap();
        assert!(documents.iter().any(|d| d.path == "/blog.xml"));
        let mut sitemaps = scope.reports()[0].sitemaps.clone();
        sitemaps.sort();
        assert_eq!(sitemaps, vec!["blog", "everything"]);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    engine.scope(Some(origin.as_str())).unwrap().render("/blog.xml").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_source_yields_empty_document() {
    let engine = engine(json!({
        "site_url": "https://site.test",
        "sources": [{"fetch": "http://127.0.0.1:9/api/urls", "timeout_ms": 500}]
    }));
    let scope = engine.scope(None).unwrap();
    let doc = scope.render("/sitemap.xml").await.unwrap();
    assert_eq!(doc.entries, 0);
    assert!(doc.body.contains("<urlset"));
    assert!(scope.reports()[0].error.is_some());
}
