//! Sitemap protocol XML rendering.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2025-01-01</lastmod>
//!   </url>
//! </urlset>
//! ```

use data_model_smap::config::IndexReference;
use data_model_smap::entry::{ImageEntry, NewsEntry, ResolvedEntry, VideoEntry};
use quick_xml::escape::escape;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
const IMAGE_NS: &str = "http://www.google.com/schemas/sitemap-image/1.1";
const VIDEO_NS: &str = "http://www.google.com/schemas/sitemap-video/1.1";
const NEWS_NS: &str = "http://www.google.com/schemas/sitemap-news/0.9";

/// Where relative locations are anchored when rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Effective site origin, e.g. `https://example.com`.
    pub site_url: &'a str,
    /// Base path without a trailing slash, empty when mounted at `/`.
    pub base_path: &'a str,
    pub xsl: Option<&'a str>,
}

impl<'a> RenderContext<'a> {
    pub fn new(site_url: &'a str, base_path: &'a str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/'),
            base_path,
            xsl: None,
        }
    }

    pub fn with_xsl(mut self, xsl: Option<&'a str>) -> Self {
        self.xsl = xsl;
        self
    }

    /// Root-relative locations get the site origin and base path; anything
    /// else is emitted as given.
    pub fn absolutize(&self, loc: &str) -> String {
        if loc.starts_with('/') && !loc.starts_with("//") {
            format!("{}{}{}", self.site_url, self.base_path, loc)
        } else {
            loc.to_string()
        }
    }
}

fn push_prolog(xml: &mut String, ctx: &RenderContext<'_>) {
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    if let Some(xsl) = ctx.xsl {
        xml.push_str("<?xml-stylesheet type=\"text/xsl\" href=\"");
        xml.push_str(&escape(&ctx.absolutize(xsl)));
        xml.push_str("\"?>\n");
    }
}

fn push_element(xml: &mut String, indent: &str, name: &str, value: &str) {
    xml.push_str(indent);
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}

fn push_optional(xml: &mut String, indent: &str, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        push_element(xml, indent, name, value);
    }
}

/// `0.5` stays `0.5`; whole numbers get one decimal (`1.0`).
pub fn format_priority(priority: f64) -> String {
    let formatted = format!("{priority}");
    if formatted.contains('.') { formatted } else { format!("{formatted}.0") }
}

/// Render a `<urlset>` document. Extension namespaces are declared only when
/// an entry uses them.
pub fn render_urlset(entries: &[ResolvedEntry], ctx: &RenderContext<'_>) -> String {
    let uses_xhtml = entries.iter().any(|e| !e.alternates.is_empty());
    let uses_image = entries.iter().any(|e| e.meta.images.as_ref().is_some_and(|i| !i.is_empty()));
    let uses_video = entries.iter().any(|e| e.meta.videos.as_ref().is_some_and(|v| !v.is_empty()));
    let uses_news = entries.iter().any(|e| e.meta.news.is_some());

    let mut xml = String::with_capacity(256 + entries.len() * 128);
    push_prolog(&mut xml, ctx);
    xml.push_str("<urlset xmlns=\"");
    xml.push_str(SITEMAP_NS);
    xml.push('"');
    for (used, prefix, ns) in [
        (uses_xhtml, "xhtml", XHTML_NS),
        (uses_image, "image", IMAGE_NS),
        (uses_video, "video", VIDEO_NS),
        (uses_news, "news", NEWS_NS),
    ] {
        if used {
            xml.push_str(&format!(" xmlns:{prefix}=\"{ns}\""));
        }
    }
    xml.push_str(">\n");

    for entry in entries {
        xml.push_str("  <url>\n");
        push_element(&mut xml, "    ", "loc", &ctx.absolutize(&entry.loc));
        push_optional(&mut xml, "    ", "lastmod", entry.meta.lastmod.as_deref());
        push_optional(&mut xml, "    ", "changefreq", entry.meta.changefreq.map(|c| c.as_str()));
        if let Some(priority) = entry.meta.priority {
            push_element(&mut xml, "    ", "priority", &format_priority(priority));
        }
        for alternate in &entry.alternates {
            xml.push_str(&format!(
                "    <xhtml:link rel=\"alternate\" hreflang=\"{}\" href=\"{}\" />\n",
                escape(&alternate.hreflang),
                escape(&ctx.absolutize(&alternate.href))
            ));
        }
        for image in entry.meta.images.iter().flatten() {
            push_image(&mut xml, image, ctx);
        }
        for video in entry.meta.videos.iter().flatten() {
            push_video(&mut xml, video, ctx);
        }
        if let Some(news) = &entry.meta.news {
            push_news(&mut xml, news);
        }
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}

fn push_image(xml: &mut String, image: &ImageEntry, ctx: &RenderContext<'_>) {
    let indent = "      ";
    xml.push_str("    <image:image>\n");
    push_element(xml, indent, "image:loc", &ctx.absolutize(&image.loc));
    push_optional(xml, indent, "image:caption", image.caption.as_deref());
    push_optional(xml, indent, "image:title", image.title.as_deref());
    push_optional(xml, indent, "image:geo_location", image.geo_location.as_deref());
    push_optional(xml, indent, "image:license", image.license.as_deref());
    xml.push_str("    </image:image>\n");
}

fn push_video(xml: &mut String, video: &VideoEntry, ctx: &RenderContext<'_>) {
    let indent = "      ";
    xml.push_str("    <video:video>\n");
    push_element(xml, indent, "video:thumbnail_loc", &ctx.absolutize(&video.thumbnail_loc));
    push_element(xml, indent, "video:title", &video.title);
    push_element(xml, indent, "video:description", &video.description);
    push_optional(xml, indent, "video:content_loc", video.content_loc.as_deref());
    push_optional(xml, indent, "video:player_loc", video.player_loc.as_deref());
    if let Some(duration) = video.duration {
        push_element(xml, indent, "video:duration", &duration.to_string());
    }
    push_optional(xml, indent, "video:publication_date", video.publication_date.as_deref());
    if let Some(family_friendly) = video.family_friendly {
        push_element(xml, indent, "video:family_friendly", if family_friendly { "yes" } else { "no" });
    }
    xml.push_str("    </video:video>\n");
}

fn push_news(xml: &mut String, news: &NewsEntry) {
    xml.push_str("    <news:news>\n      <news:publication>\n");
    push_element(xml, "        ", "news:name", &news.publication.name);
    push_element(xml, "        ", "news:language", &news.publication.language);
    xml.push_str("      </news:publication>\n");
    push_element(xml, "      ", "news:publication_date", &news.publication_date);
    push_element(xml, "      ", "news:title", &news.title);
    xml.push_str("    </news:news>\n");
}

/// Render a `<sitemapindex>` document.
pub fn render_index(refs: &[IndexReference], ctx: &RenderContext<'_>) -> String {
    let mut xml = String::with_capacity(256 + refs.len() * 96);
    push_prolog(&mut xml, ctx);
    xml.push_str("<sitemapindex xmlns=\"");
    xml.push_str(SITEMAP_NS);
    xml.push_str("\">\n");
    for reference in refs {
        xml.push_str("  <sitemap>\n");
        push_element(&mut xml, "    ", "loc", &ctx.absolutize(&reference.sitemap));
        push_optional(&mut xml, "    ", "lastmod", reference.lastmod.as_deref());
        xml.push_str("  </sitemap>\n");
    }
    xml.push_str("</sitemapindex>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_model_smap::entry::{Alternate, ChangeFreq, EntryMeta, ParsedLoc};

    fn entry(loc: &str) -> ResolvedEntry {
        ResolvedEntry {
            loc: loc.to_string(),
            key: loc.to_string(),
            path: ParsedLoc {
                pathname: loc.to_string(),
                ..Default::default()
            },
            canonical_path: loc.to_string(),
            meta: EntryMeta::default(),
            alternates: Vec::new(),
            locale: None,
            sitemap: None,
        }
    }

    fn ctx() -> RenderContext<'static> {
        RenderContext::new("https://example.com/", "")
    }

    #[test]
    fn test_empty_urlset() {
        let xml = render_urlset(&[], &ctx());
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(&format!(r#"<urlset xmlns="{SITEMAP_NS}">"#)));
        assert!(!xml.contains("<url>"));
    }

    #[test]
    fn test_entry_fields() {
        let mut e = entry("/a?x=1&y=2");
        e.meta = EntryMeta {
            lastmod: Some("2025-01-01".to_string()),
            changefreq: Some(ChangeFreq::Weekly),
            priority: Some(1.0),
            ..Default::default()
        };
        let xml = render_urlset(&[e], &ctx());
        assert!(xml.contains("<loc>https://example.com/a?x=1&amp;y=2</loc>"));
        assert!(xml.contains("<lastmod>2025-01-01</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.contains("<priority>1.0</priority>"));
        assert!(!xml.contains("xmlns:xhtml"));
    }

    #[test]
    fn test_alternates_declare_xhtml() {
        let mut e = entry("/fr/about");
        e.alternates = vec![
            Alternate::new("x-default", "/about"),
            Alternate::new("fr-FR", "https://example.fr/about"),
        ];
        let xml = render_urlset(&[e], &ctx());
        assert!(xml.contains(&format!(r#"xmlns:xhtml="{XHTML_NS}""#)));
        assert!(xml.contains(
            r#"<xhtml:link rel="alternate" hreflang="x-default" href="https://example.com/about" />"#
        ));
        assert!(xml.contains(r#"hreflang="fr-FR" href="https://example.fr/about""#));
    }

    #[test]
    fn test_base_path_and_external() {
        let ctx = RenderContext::new("https://example.com", "/docs");
        assert_eq!(ctx.absolutize("/a"), "https://example.com/docs/a");
        assert_eq!(ctx.absolutize("https://other.test/a"), "https://other.test/a");
    }

    #[test]
    fn test_pre_encoded_sequences_survive() {
        let xml = render_urlset(&[entry("/caf%C3%A9")], &ctx());
        assert!(xml.contains("<loc>https://example.com/caf%C3%A9</loc>"));
    }

    #[test]
    fn test_image_namespace_only_when_used() {
        let mut e = entry("/gallery");
        e.meta.images = Some(vec![ImageEntry {
            loc: "/a.png".to_string(),
            title: Some("A & B".to_string()),
            ..Default::default()
        }]);
        let xml = render_urlset(&[e], &ctx());
        assert!(xml.contains(&format!(r#"xmlns:image="{IMAGE_NS}""#)));
        assert!(!xml.contains("xmlns:video"));
        assert!(xml.contains("<image:loc>https://example.com/a.png</image:loc>"));
        assert!(xml.contains("<image:title>A &amp; B</image:title>"));
    }

    #[test]
    fn test_xsl_and_index() {
        let refs = vec![
            IndexReference {
                sitemap: "/posts-0.xml".to_string(),
                lastmod: Some("2024-02-02".to_string()),
            },
            IndexReference {
                sitemap: "https://shop.test/sitemap.xml".to_string(),
                lastmod: None,
            },
        ];
        let ctx = ctx().with_xsl(Some("/__sitemap__/style.xsl"));
        let xml = render_index(&refs, &ctx);
        assert!(xml.contains(
            r#"<?xml-stylesheet type="text/xsl" href="https://example.com/__sitemap__/style.xsl"?>"#
        ));
        assert!(xml.contains("<loc>https://example.com/posts-0.xml</loc>"));
        assert!(xml.contains("<lastmod>2024-02-02</lastmod>"));
        assert!(xml.contains("<loc>https://shop.test/sitemap.xml</loc>"));
        assert_eq!(xml.matches("<sitemap>").count(), 2);
    }

    #[test]
    fn test_format_priority() {
        assert_eq!(format_priority(0.5), "0.5");
        assert_eq!(format_priority(1.0), "1.0");
        assert_eq!(format_priority(0.0), "0.0");
    }
}
