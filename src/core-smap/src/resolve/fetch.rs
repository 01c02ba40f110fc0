//! Source fetching: literal lists, HTTP endpoints, XML sitemaps and local
//! files, with request-scoped memoization and optional pagination.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use data_model_smap::config::{FetchSource, SourceDescriptor};
use data_model_smap::entry::{EntryInput, EntryMeta, RawEntry};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use crate::errors::{Result, SitemapError};

/// What one source produced during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub entries: Vec<RawEntry>,
    /// Malformed entries dropped while decoding.
    pub dropped: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl FetchOutcome {
    fn failed(error: &SitemapError, started: Instant) -> Self {
        Self {
            error: Some(error.to_string()),
            duration_ms: elapsed_ms(started),
            ..Default::default()
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// One decoded response page.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePage {
    Entries { entries: Vec<RawEntry>, dropped: usize },
    /// The endpoint asks the consumer to advance pagination.
    Skip { offset: Option<usize>, limit: Option<usize> },
}

type MemoCell = Arc<OnceCell<Arc<FetchOutcome>>>;

/// Per-request memo: every distinct source identity is fetched at most once
/// no matter how many sitemaps reference it. Never shared across requests.
#[derive(Debug, Default)]
pub struct RequestMemo {
    cells: Mutex<HashMap<String, MemoCell>>,
}

impl RequestMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, identity: &str) -> MemoCell {
        let mut cells = match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cells.entry(identity.to_string()).or_default().clone()
    }

    /// Outcomes recorded so far, keyed by source identity.
    pub fn outcomes(&self) -> Vec<(String, Arc<FetchOutcome>)> {
        let cells = match self.cells.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<_> = cells
            .iter()
            .filter_map(|(identity, cell)| cell.get().map(|outcome| (identity.clone(), outcome.clone())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Fetches source descriptors into raw entries.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    default_timeout: Option<Duration>,
}

impl Default for SourceFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SourceFetcher {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout,
        }
    }

    /// Fetch one descriptor, memoized by identity within `memo`. Failures are
    /// recorded in the outcome rather than raised.
    pub async fn fetch(&self, descriptor: &SourceDescriptor, origin: Option<&Url>, memo: &RequestMemo) -> Arc<FetchOutcome> {
        let Some(request) = descriptor.as_request() else {
            return Arc::new(literal_outcome(descriptor));
        };

        let identity = descriptor.identity();
        let cell = memo.cell(&identity);
        cell.get_or_init(|| async {
            tracing::debug!(source = %request.fetch, "fetching source");
            let started = Instant::now();
            match self.fetch_request(&request, origin).await {
                Ok((entries, dropped)) => {
                    tracing::debug!(source = %request.fetch, entries = entries.len(), dropped, "source fetched");
                    Arc::new(FetchOutcome {
                        entries,
                        dropped,
                        error: None,
                        duration_ms: elapsed_ms(started),
                    })
                }
                Err(e) => {
                    let err = SitemapError::SourceFetch {
                        source_id: request.fetch.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!(source = %request.fetch, "{}", err);
                    Arc::new(FetchOutcome::failed(&err, started))
                }
            }
        })
        .await
        .clone()
    }

    async fn fetch_request(&self, source: &FetchSource, origin: Option<&Url>) -> Result<(Vec<RawEntry>, usize)> {
        let timeout = source.timeout_ms.map(Duration::from_millis).or(self.default_timeout);
        let work = self.fetch_all_pages(source, origin);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| SitemapError::SourceFetch {
                source_id: source.fetch.clone(),
                reason: format!("timed out after {}ms", limit.as_millis()),
            })?,
            None => work.await,
        }
    }

    async fn fetch_all_pages(&self, source: &FetchSource, origin: Option<&Url>) -> Result<(Vec<RawEntry>, usize)> {
        let Some(pagination) = source.paginate else {
            return match self.fetch_page(source, origin, None).await? {
                SourcePage::Entries { entries, dropped } => Ok((entries, dropped)),
                SourcePage::Skip { .. } => Ok((Vec::new(), 0)),
            };
        };

        let mut entries = Vec::new();
        let mut dropped = 0;
        let mut offset = 0;
        let mut limit = pagination.limit.max(1);
        for _ in 0..pagination.max_pages {
            match self.fetch_page(source, origin, Some((offset, limit))).await? {
                SourcePage::Entries { entries: page, dropped: page_dropped } => {
                    if page.is_empty() && page_dropped == 0 {
                        return Ok((entries, dropped));
                    }
                    offset += page.len() + page_dropped;
                    entries.extend(page);
                    dropped += page_dropped;
                }
                SourcePage::Skip {
                    offset: next_offset,
                    limit: next_limit,
                } => {
                    limit = next_limit.unwrap_or(limit).max(1);
                    offset = next_offset.filter(|o| *o > offset).unwrap_or(offset + limit);
                }
            }
        }
        tracing::warn!(source = %source.fetch, max_pages = pagination.max_pages, "pagination stopped at max_pages");
        Ok((entries, dropped))
    }

    async fn fetch_page(&self, source: &FetchSource, origin: Option<&Url>, page: Option<(usize, usize)>) -> Result<SourcePage> {
        if let Some(path) = source.fetch.strip_prefix("file://") {
            let body = tokio::fs::read_to_string(path).await?;
            return decode_body(&body, path.ends_with(".xml"));
        }

        let mut url = resolve_source_url(&source.fetch, origin)?;
        if !source.query.is_empty() || page.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &source.query {
                pairs.append_pair(key, value);
            }
            if let Some((offset, limit)) = page {
                pairs.append_pair("offset", &offset.to_string());
                pairs.append_pair("limit", &limit.to_string());
            }
        }

        let method = match &source.method {
            Some(method) => Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| SitemapError::InvalidConfig(format!("invalid method '{method}': {e}")))?,
            None => Method::GET,
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &source.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SitemapError::InvalidConfig(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SitemapError::InvalidConfig(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = &source.body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_string(body)?);
        }

        let response = request.send().await?.error_for_status()?;
        let is_xml = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("xml"));
        let body = response.text().await?;
        decode_body(&body, is_xml)
    }
}

/// Absolute `http(s)` URLs are used as-is; root-relative paths are resolved
/// against the request's effective origin.
pub fn resolve_source_url(fetch: &str, origin: Option<&Url>) -> Result<Url> {
    match Url::parse(fetch) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let origin = origin.ok_or_else(|| SitemapError::SourceFetch {
                source_id: fetch.to_string(),
                reason: "relative source without a site URL or request host".to_string(),
            })?;
            Ok(origin.join(fetch)?)
        }
        Err(e) => Err(e.into()),
    }
}

fn literal_outcome(descriptor: &SourceDescriptor) -> FetchOutcome {
    match descriptor {
        SourceDescriptor::Literal(entries) => FetchOutcome {
            entries: entries.clone(),
            ..Default::default()
        },
        _ => FetchOutcome::default(),
    }
}

/// Decode a response body: an XML `<urlset>`, a JSON array of entries, a
/// `{"urls": [...]}` wrapper or a skip signal.
pub fn decode_body(body: &str, is_xml: bool) -> Result<SourcePage> {
    if is_xml || body.trim_start().starts_with('<') {
        let entries = parse_urlset(body)?;
        return Ok(SourcePage::Entries { entries, dropped: 0 });
    }

    let value: Value = serde_json::from_str(body)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            if object.get("skip").and_then(Value::as_bool) == Some(true) {
                let hint = |key: &str| {
                    object
                        .get(key)
                        .and_then(Value::as_u64)
                        .and_then(|v| usize::try_from(v).ok())
                };
                return Ok(SourcePage::Skip {
                    offset: hint("offset"),
                    limit: hint("limit"),
                });
            }
            match object.remove("urls") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(SitemapError::SourceFetch {
                        source_id: "response".to_string(),
                        reason: "expected an array of entries".to_string(),
                    });
                }
            }
        }
        _ => {
            return Err(SitemapError::SourceFetch {
                source_id: "response".to_string(),
                reason: "expected an array of entries".to_string(),
            });
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match serde_json::from_value::<RawEntry>(item.clone()) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let err = SitemapError::MalformedEntry {
                    loc: item.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}", err);
                dropped += 1;
            }
        }
    }
    Ok(SourcePage::Entries { entries, dropped })
}

/// Parses a `<urlset>` document into raw entries. Only direct children of
/// `<url>` are read, so extension blocks such as `<image:image>` or
/// `<video:video>` never leak into the page fields. An empty document yields
/// no entries.
///
/// # Errors
///
/// Returns an error if the XML is malformed.
pub fn parse_urlset(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryInput> = None;
    // Depth below the open `<url>` element, 0 when outside one.
    let mut depth = 0usize;
    let mut field: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                if current.is_none() {
                    if name == b"url" {
                        current = Some(EntryInput::new(""));
                        depth = 1;
                    }
                } else {
                    depth += 1;
                    field = (depth == 2).then_some(name);
                }
            }
            Event::Text(text) => {
                if let (Some(entry), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let value = text
                        .unescape()
                        .map_err(|e| SitemapError::XmlError(e.into()))?
                        .into_owned();
                    apply_field(entry, name, value);
                }
            }
            Event::End(_) if current.is_some() => {
                field = None;
                depth -= 1;
                if depth == 0 {
                    if let Some(entry) = current.take().filter(|e| !e.loc.is_empty()) {
                        entries.push(RawEntry::FullEntry(entry));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn apply_field(entry: &mut EntryInput, name: &[u8], value: String) {
    let meta: &mut EntryMeta = &mut entry.meta;
    match name {
        b"loc" => entry.loc = value,
        b"lastmod" => meta.lastmod = Some(value),
        b"changefreq" => meta.changefreq = serde_json::from_value(Value::String(value)).ok(),
        b"priority" => meta.priority = value.parse().ok(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Query;
    use axum::routing::get;
    use data_model_smap::entry::ChangeFreq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn serve(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/page1?a=1&amp;b=2</loc>
    <lastmod>2024-01-01</lastmod>
    <changefreq>daily</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc>/page2</loc>
  </url>
</urlset>"#;

        let entries = parse_urlset(xml).unwrap();
        assert_eq!(entries.len(), 2);
        let first = entries[0].clone().into_input();
        assert_eq!(first.loc, "https://example.com/page1?a=1&b=2");
        assert_eq!(first.meta.lastmod.as_deref(), Some("2024-01-01"));
        assert_eq!(first.meta.changefreq, Some(ChangeFreq::Daily));
        assert_eq!(first.meta.priority, Some(0.8));
        assert_eq!(entries[1].loc(), "/page2");
    }

    #[test]
    fn test_parse_urlset_ignores_extension_blocks() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
        xmlns:image="http://www.google.com/schemas/sitemap-image/1.1"
        xmlns:video="http://www.google.com/schemas/sitemap-video/1.1">
  <url>
    <loc>https://example.com/page</loc>
    <image:image>
      <image:loc>https://example.com/photo.jpg</image:loc>
    </image:image>
    <video:video>
      <video:title>clip</video:title>
      <video:publication_date>2020-01-01</video:publication_date>
    </video:video>
    <lastmod>2024-02-02</lastmod>
  </url>
  <url>
    <image:image><image:loc>https://example.com/orphan.jpg</image:loc></image:image>
  </url>
</urlset>"#;

        let entries = parse_urlset(xml).unwrap();
        assert_eq!(entries.len(), 1);
        let page = entries[0].clone().into_input();
        assert_eq!(page.loc, "https://example.com/page");
        assert_eq!(page.meta.lastmod.as_deref(), Some("2024-02-02"));
    }

    #[test]
    fn test_parse_urlset_empty() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"></urlset>"#;
        assert!(parse_urlset(xml).unwrap().is_empty());
    }

    #[test]
    fn test_decode_json_shapes() {
        let page = decode_body(r#"["/a", {"loc": "/b"}, 42, {"nope": 1}]"#, false).unwrap();
        assert_eq!(
            page,
            SourcePage::Entries {
                entries: vec!["/a".into(), RawEntry::FullEntry(EntryInput::new("/b"))],
                dropped: 2,
            }
        );

        let page = decode_body(r#"{"urls": ["/x"]}"#, false).unwrap();
        assert!(matches!(page, SourcePage::Entries { ref entries, .. } if entries.len() == 1));

        let page = decode_body(r#"{"skip": true, "offset": 20}"#, false).unwrap();
        assert_eq!(page, SourcePage::Skip { offset: Some(20), limit: None });

        assert!(decode_body(r#"{"other": 1}"#, false).is_err());
    }

    #[test]
    fn test_resolve_source_url() {
        let origin = Url::parse("https://site.test/").unwrap();
        assert_eq!(
            resolve_source_url("/api/urls", Some(&origin)).unwrap().as_str(),
            "https://site.test/api/urls"
        );
        assert_eq!(
            resolve_source_url("https://cms.test/a.json", None).unwrap().as_str(),
            "https://cms.test/a.json"
        );
        assert!(resolve_source_url("/api/urls", None).is_err());
    }

    #[tokio::test]
    async fn test_literal_source() {
        let fetcher = SourceFetcher::default();
        let memo = RequestMemo::new();
        let descriptor = SourceDescriptor::Literal(vec!["/a".into(), "/b".into()]);
        let outcome = fetcher.fetch(&descriptor, None, &memo).await;
        assert_eq!(outcome.entries.len(), 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_same_source_fetched_once_per_memo() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/urls",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    r#"["/a", "/b"]"#
                }
            }),
        );
        let origin = serve(app).await;

        let fetcher = SourceFetcher::default();
        let memo = RequestMemo::new();
        let bare = SourceDescriptor::Fetch("/api/urls".to_string());
        let object: SourceDescriptor = serde_json::from_str(r#"{"fetch": "/api/urls"}"#).unwrap();

        let (a, b) = tokio::join!(
            fetcher.fetch(&bare, Some(&origin), &memo),
            fetcher.fetch(&object, Some(&origin), &memo)
        );
        assert_eq!(a.entries.len(), 2);
        assert_eq!(a, b);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let next_request = RequestMemo::new();
        fetcher.fetch(&bare, Some(&origin), &next_request).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let app = Router::new().route("/broken", get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }));
        let origin = serve(app).await;

        let fetcher = SourceFetcher::default();
        let outcome = fetcher
            .fetch(&SourceDescriptor::Fetch("/broken".to_string()), Some(&origin), &RequestMemo::new())
            .await;
        assert!(outcome.entries.is_empty());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_recorded() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "[]"
            }),
        );
        let origin = serve(app).await;

        let descriptor: SourceDescriptor = serde_json::from_str(r#"{"fetch": "/slow", "timeout_ms": 50}"#).unwrap();
        let outcome = SourceFetcher::default()
            .fetch(&descriptor, Some(&origin), &RequestMemo::new())
            .await;
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_pagination_with_skip_signal() {
        let app = Router::new().route(
            "/pages",
            get(|Query(params): Query<HashMap<String, usize>>| async move {
                let offset = params.get("offset").copied().unwrap_or(0);
                match offset {
                    0 => r#"["/p0", "/p1"]"#.to_string(),
                    2 => r#"{"skip": true, "offset": 4}"#.to_string(),
                    4 => r#"["/p4"]"#.to_string(),
                    _ => "[]".to_string(),
                }
            }),
        );
        let origin = serve(app).await;

        let descriptor: SourceDescriptor =
            serde_json::from_str(r#"{"fetch": "/pages", "paginate": {"limit": 2}}"#).unwrap();
        let outcome = SourceFetcher::default()
            .fetch(&descriptor, Some(&origin), &RequestMemo::new())
            .await;
        let locs: Vec<&str> = outcome.entries.iter().map(RawEntry::loc).collect();
        assert_eq!(locs, vec!["/p0", "/p1", "/p4"]);
    }

    #[tokio::test]
    async fn test_xml_source() {
        let app = Router::new().route(
            "/sitemap.xml",
            get(|| async {
                (
                    [(axum::http::header::CONTENT_TYPE, "application/xml")],
                    "<urlset><url><loc>/from-xml</loc></url></urlset>",
                )
            }),
        );
        let origin = serve(app).await;
        let outcome = SourceFetcher::default()
            .fetch(&SourceDescriptor::Fetch("/sitemap.xml".to_string()), Some(&origin), &RequestMemo::new())
            .await;
        assert_eq!(outcome.entries, vec![RawEntry::FullEntry(EntryInput::new("/from-xml"))]);
    }

    #[tokio::test]
    async fn test_file_source() {
        let path = std::env::temp_dir().join(format!("core-smap-source-{}.json", std::process::id()));
        std::fs::write(&path, r#"["/from-file"]"#).unwrap();
        let descriptor = SourceDescriptor::Fetch(format!("file://{}", path.display()));
        let outcome = SourceFetcher::default().fetch(&descriptor, None, &RequestMemo::new()).await;
        std::fs::remove_file(&path).ok();
        assert_eq!(outcome.entries, vec![RawEntry::from("/from-file")]);
    }
}
